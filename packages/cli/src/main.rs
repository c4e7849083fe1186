//! `rpcctl`: raw calls against an installer RPC server.
//!
//! - **`call`**: send one request and print the response.
//! - **`status`**: fetch `/meta/status`, optionally long-polling.
//!
//! The server is reached over a Unix socket (`--socket`) or a loopback URL
//! (`--url`). Query values are sent exactly as given, so pass JSON text when
//! the endpoint expects it: `-q 'arg="value"'`.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use installrpc_api::Verb;
use installrpc_client::{
    HttpTransport, RpcRequest, RpcResponse, Transport, TransportError, UnixTransport,
};

/// rpcctl: installer RPC command-line client
#[derive(Parser)]
#[command(name = "rpcctl", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    target: Target,

    /// Print the response status and x-* headers to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Target {
    /// Unix socket the server listens on.
    #[arg(long, env = "INSTALLRPC_SOCKET", global = true, conflicts_with = "url")]
    socket: Option<PathBuf>,

    /// Loopback base URL, e.g. http://127.0.0.1:8235.
    #[arg(long, env = "INSTALLRPC_URL", global = true)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one request.
    ///
    /// Examples:
    ///   rpcctl --socket /run/installrpc.sock call GET /meta/status
    ///   rpcctl call POST /meta/echo --data '{"a": 1}'
    ///   rpcctl call GET /value -q 'arg=2' -H 'x-make-view-request: yes'
    Call {
        /// GET | POST | PUT | PATCH | DELETE
        verb: Verb,

        /// Request path, e.g. /meta/status.
        path: String,

        /// Query argument as NAME=VALUE. Repeatable.
        #[arg(short = 'q', long = "query", value_name = "NAME=VALUE")]
        query: Vec<String>,

        /// Extra header as NAME: VALUE. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,

        /// JSON request body.
        #[arg(short, long, value_name = "JSON", conflicts_with = "data_file")]
        data: Option<String>,

        /// File holding the JSON request body, or `-` for stdin.
        #[arg(long, value_name = "FILE")]
        data_file: Option<PathBuf>,
    },

    /// Print the application status.
    Status {
        /// Wait until the state differs from this one (e.g. STARTING_UP).
        #[arg(long, value_name = "STATE")]
        wait_from: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let transport = transport(&cli.target).unwrap_or_else(|e| fatal(&e.to_string()));

    let request = match cli.command {
        Command::Call {
            verb,
            path,
            query,
            headers,
            data,
            data_file,
        } => {
            let body = match (data, data_file) {
                (Some(d), _) => Some(d),
                (None, Some(file)) => Some(read_input(&file)),
                (None, None) => None,
            };
            if let Some(body) = &body {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(body) {
                    fatal(&format!("request body is not valid JSON: {e}"));
                }
            }
            let query = query
                .iter()
                .map(|q| parse_query(q))
                .collect::<Result<Vec<_>, _>>()
                .unwrap_or_else(|e| fatal(&e));
            let headers = headers
                .iter()
                .map(|h| parse_header(h))
                .collect::<Result<Vec<_>, _>>()
                .unwrap_or_else(|e| fatal(&e));
            RpcRequest {
                verb,
                path: with_query(&path, &query),
                headers,
                body: body.map(String::into_bytes),
            }
        }
        Command::Status { wait_from } => {
            let query: Vec<(String, String)> = wait_from
                .map(|state| ("cur".to_string(), serde_json::Value::String(state).to_string()))
                .into_iter()
                .collect();
            RpcRequest {
                verb: Verb::Get,
                path: with_query("/meta/status", &query),
                headers: Vec::new(),
                body: None,
            }
        }
    };

    let resp = transport
        .request(request)
        .await
        .unwrap_or_else(|e| fatal(&e.to_string()));
    print_response(&resp, cli.verbose);
    if !resp.is_success() {
        process::exit(1);
    }
}

fn transport(target: &Target) -> Result<Box<dyn Transport>, TransportError> {
    match (&target.socket, &target.url) {
        (Some(path), _) => Ok(Box::new(UnixTransport::new(path))),
        (None, Some(url)) => Ok(Box::new(HttpTransport::new(url)?)),
        (None, None) => Ok(Box::new(HttpTransport::new("http://127.0.0.1:8235")?)),
    }
}

fn print_response(resp: &RpcResponse, verbose: bool) {
    if verbose || !resp.is_success() {
        eprintln!("status: {}", resp.status);
        for (name, value) in &resp.headers {
            if name.as_str().starts_with("x-") {
                eprintln!("{name}: {}", value.to_str().unwrap_or("<binary>"));
            }
        }
    }
    match resp.json() {
        Ok(json) => match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", resp.text()),
        },
        Err(_) if resp.body.is_empty() => {}
        Err(_) => println!("{}", resp.text()),
    }
}

/// `name=value`, split at the first `=`.
fn parse_query(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid query argument {raw:?}: expected NAME=VALUE"))
}

/// `name: value`, split at the first `:`.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("invalid header {raw:?}: expected NAME: VALUE"))
}

fn with_query(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let qs: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    format!("{path}?{}", qs.join("&"))
}

/// Read the full contents of a file, or stdin when the path is `"-"`.
fn read_input(path: &PathBuf) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {e}")));
        buf
    } else {
        fs::read_to_string(path)
            .unwrap_or_else(|e| fatal(&format!("failed to read {}: {e}", path.display())))
    }
}

/// Print an error message to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("rpcctl: {msg}");
    process::exit(2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_encoded_verbatim() {
        let q = vec![parse_query("arg=\"a b\"").unwrap(), parse_query("n=2").unwrap()];
        assert_eq!(with_query("/x", &q), "/x?arg=%22a%20b%22&n=2");
        assert_eq!(with_query("/x", &[]), "/x");
        assert!(parse_query("novalue").is_err());
    }

    #[test]
    fn headers_split_at_first_colon() {
        assert_eq!(
            parse_header("x-make-view-request: yes").unwrap(),
            ("x-make-view-request".to_string(), "yes".to_string())
        );
        assert!(parse_header(": yes").is_err());
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["rpcctl", "call", "post", "/meta/echo", "-d", "1"]).unwrap();
        match cli.command {
            Command::Call { verb, data, .. } => {
                assert_eq!(verb, Verb::Post);
                assert_eq!(data.as_deref(), Some("1"));
            }
            Command::Status { .. } => panic!("expected call"),
        }
    }
}
