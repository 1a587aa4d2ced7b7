//! Command-line surface over a [`ClientTree`].
//!
//! Every resource node of a tree is reachable by name:
//!
//! ```text
//! canopy list   Albums <artist-id>
//! canopy get    Albums <album-id> <artist-id>
//! canopy post   Albums <artist-id> -d '{"title":"Pastel Blues"}'
//! canopy patch  Albums <album-id> -p <artist-id> -d '{"year":1965}'
//! canopy delete Songs  <song-id> <artist-id> <album-id>
//! canopy list   Songs  <artist-id> <album-id> -q end_dated=true
//! ```
//!
//! Item verbs take the item id first. Ancestor ids follow, root first, and
//! may also be given with repeated `-p`; positional ancestors come before
//! flagged ones. Configuration travels in a [`CliConfig`] value, never in
//! process-global state, so several trees can be driven side by side.

use crate::client::{parse_query, ClientConfig, ClientTree};
use crate::error::{CanopyError, Result};
use crate::server::ResourceTree;
use crate::types::Verb;
use clap::{Args, Subcommand};
use serde_json::Value;

/// Exit status for usage and contract errors.
pub const EXIT_USAGE: i32 = 2;
/// Exit status for every other failure.
pub const EXIT_FAILURE: i32 = 1;

/// Arguments shared by every client command.
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Node name, e.g. Albums
    pub target: String,
    /// Item id (item verbs only), then ancestor ids, root first
    pub ids: Vec<String>,
    /// Ancestor id, root first; repeatable
    #[arg(short = 'p', long = "parent", value_name = "ID")]
    pub parents: Vec<String>,
    /// Request body
    #[arg(short = 'd', long = "data", value_name = "JSON")]
    pub data: Option<String>,
    /// Query string, e.g. end_dated=true
    #[arg(short = 'q', long = "query", value_name = "QUERY")]
    pub query: Option<String>,
}

/// One request against a named node.
#[derive(Debug, Clone, Subcommand)]
pub enum ClientCommand {
    /// Fetch one item
    Get(TargetArgs),
    /// List a collection
    List(TargetArgs),
    /// Create an item; the server assigns its id
    Post(TargetArgs),
    /// Create or replace an item
    Put(TargetArgs),
    /// Partially update an item
    Patch(TargetArgs),
    /// Delete an item (end-dated items: first call end-dates)
    Delete(TargetArgs),
}

impl ClientCommand {
    /// Verb the command maps to.
    pub fn verb(&self) -> Verb {
        match self {
            ClientCommand::Get(_) => Verb::Get,
            ClientCommand::List(_) => Verb::List,
            ClientCommand::Post(_) => Verb::Create,
            ClientCommand::Put(_) => Verb::Put,
            ClientCommand::Patch(_) => Verb::Patch,
            ClientCommand::Delete(_) => Verb::Delete,
        }
    }

    /// Arguments of any variant.
    pub fn args(&self) -> &TargetArgs {
        match self {
            ClientCommand::Get(args)
            | ClientCommand::List(args)
            | ClientCommand::Post(args)
            | ClientCommand::Put(args)
            | ClientCommand::Patch(args)
            | ClientCommand::Delete(args) => args,
        }
    }
}

/// Settings the command tree is built with.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Server address, e.g. `http://127.0.0.1:8080`.
    pub address: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8080".into(),
            timeout_ms: 30_000,
            pretty: true,
        }
    }
}

impl CliConfig {
    /// Client settings for the mirrors this command tree drives.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout_ms: self.timeout_ms,
            enable_logging: false,
            ..ClientConfig::default()
        }
    }
}

/// A command with its arguments checked against the verb.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation<'a> {
    verb: Verb,
    id: Option<&'a str>,
    parents: Vec<&'a str>,
    body: Option<Vec<u8>>,
    query: Vec<(String, String)>,
}

fn invocation(command: &ClientCommand) -> Result<Invocation<'_>> {
    let verb = command.verb();
    let args = command.args();

    let mut positional = args.ids.iter().map(String::as_str);
    let id = if verb.is_item() {
        Some(positional.next().ok_or_else(|| {
            CanopyError::Usage(format!("{verb} {} needs an item id", args.target))
        })?)
    } else {
        None
    };
    let parents: Vec<&str> = positional
        .chain(args.parents.iter().map(String::as_str))
        .collect();

    let takes_body = matches!(verb, Verb::Create | Verb::Put | Verb::Patch);
    let body = match (&args.data, takes_body) {
        (Some(data), true) => {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| CanopyError::Usage(format!("invalid JSON body: {e}")))?;
            Some(serde_json::to_vec(&value)?)
        }
        (None, true) => return Err(CanopyError::Usage(format!("{verb} needs a body (-d)"))),
        (Some(_), false) => {
            return Err(CanopyError::Usage(format!("{verb} does not take a body")))
        }
        (None, false) => None,
    };

    let query = args.query.as_deref().map(parse_query).unwrap_or_default();
    Ok(Invocation {
        verb,
        id,
        parents,
        body,
        query,
    })
}

/// Run `command` against `clients` and return what should be printed.
pub async fn dispatch(
    clients: &ClientTree,
    command: &ClientCommand,
    config: &CliConfig,
) -> Result<String> {
    let target = &command.args().target;
    let client = clients.get(target)?;
    let call = invocation(command)?;

    tracing::debug!(%target, verb = %call.verb, "dispatching");
    let res = client
        .send_raw(call.verb, call.id, &call.parents, call.body, &call.query)
        .await?;
    if res.body.is_empty() {
        return Ok(String::new());
    }
    match serde_json::from_slice::<Value>(&res.body) {
        Ok(value) if config.pretty => Ok(serde_json::to_string_pretty(&value)?),
        Ok(value) => Ok(serde_json::to_string(&value)?),
        Err(_) => res.text(),
    }
}

/// Mirror `tree` at `config.address` and run `command`.
pub async fn run(tree: &ResourceTree, command: &ClientCommand, config: &CliConfig) -> Result<String> {
    let clients = ClientTree::build(tree, &config.address, config.client_config())?;
    dispatch(&clients, command, config).await
}

/// Process exit status for an error.
pub fn exit_code(err: &CanopyError) -> i32 {
    if err.is_contract_error() {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: ClientCommand,
    }

    fn parse(args: &[&str]) -> ClientCommand {
        TestCli::try_parse_from(std::iter::once("canopy").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_item_id_comes_first() {
        let command = parse(&["get", "Songs", "s1", "a1", "-p", "b1"]);
        let call = invocation(&command).unwrap();
        assert_eq!(call.verb, Verb::Get);
        assert_eq!(call.id, Some("s1"));
        assert_eq!(call.parents, ["a1", "b1"]);
    }

    #[test]
    fn test_list_takes_only_ancestors() {
        let command = parse(&["list", "Albums", "a1", "-q", "end_dated=true&genre=jazz"]);
        let call = invocation(&command).unwrap();
        assert_eq!(call.id, None);
        assert_eq!(call.parents, ["a1"]);
        assert_eq!(
            call.query,
            [
                ("end_dated".to_string(), "true".to_string()),
                ("genre".to_string(), "jazz".to_string())
            ]
        );
    }

    #[test]
    fn test_body_rules() {
        let missing = invocation(&parse(&["post", "Artists"])).unwrap_err();
        assert!(matches!(missing, CanopyError::Usage(_)));

        let invalid = invocation(&parse(&["post", "Artists", "-d", "{nope"])).unwrap_err();
        assert!(matches!(invalid, CanopyError::Usage(_)));

        let extra = invocation(&parse(&["get", "Artists", "a1", "-d", "{}"])).unwrap_err();
        assert!(matches!(extra, CanopyError::Usage(_)));

        let parsed = parse(&["post", "Artists", "-d", r#"{ "name": "A" }"#]);
        let call = invocation(&parsed).unwrap();
        assert_eq!(call.body.as_deref(), Some(br#"{"name":"A"}"#.as_slice()));
    }

    #[test]
    fn test_item_verb_without_id() {
        let err = invocation(&parse(&["delete", "Artists"])).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_USAGE);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code(&CanopyError::ArgumentCount {
                expected: 1,
                got: 0
            }),
            EXIT_USAGE
        );
        assert_eq!(exit_code(&CanopyError::Http("refused".into())), EXIT_FAILURE);
    }
}
