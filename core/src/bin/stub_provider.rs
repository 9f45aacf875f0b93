/// Scriptable tool provider for integration tests.
///
/// Speaks the line-delimited JSON-RPC protocol on stdin/stdout and
/// misbehaves on request:
///
///   stub_provider [--tool NAME]... [--list-shape SHAPE]
///                 [--hang-init] [--hang-list] [--ignore-shutdown]
///
/// SHAPE is one of: wrapped (default), bare, empty-object, null, garbage.
/// A tool named "explode" answers `tools/call` with an error payload; a
/// tool named "hang" never answers at all.
use serde_json::{json, Value};
use std::io::{BufRead, Write};

#[derive(Default)]
struct Behavior {
    tools: Vec<String>,
    list_shape: String,
    hang_init: bool,
    hang_list: bool,
    ignore_shutdown: bool,
}

fn parse_args() -> Behavior {
    let mut behavior = Behavior {
        list_shape: "wrapped".to_string(),
        ..Behavior::default()
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--tool" => {
                if let Some(name) = args.next() {
                    behavior.tools.push(name);
                }
            }
            "--list-shape" => {
                if let Some(shape) = args.next() {
                    behavior.list_shape = shape;
                }
            }
            "--hang-init" => behavior.hang_init = true,
            "--hang-list" => behavior.hang_list = true,
            "--ignore-shutdown" => behavior.ignore_shutdown = true,
            other => {
                eprintln!("stub_provider: unknown flag: {}", other);
                std::process::exit(2);
            }
        }
    }

    behavior
}

fn tool_entries(behavior: &Behavior) -> Vec<Value> {
    behavior
        .tools
        .iter()
        .map(|name| json!({"name": name, "description": format!("stub tool {}", name)}))
        .collect()
}

fn list_result(behavior: &Behavior) -> Value {
    match behavior.list_shape.as_str() {
        "bare" => Value::Array(tool_entries(behavior)),
        "empty-object" => json!({}),
        "null" => Value::Null,
        "garbage" => json!("not a tool list"),
        _ => json!({"tools": tool_entries(behavior)}),
    }
}

fn respond(result_or_error: Result<Value, Value>, id: Value) {
    let msg = match result_or_error {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
    };
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    // Stdout is pipe-buffered; flush per line or the client never sees it
    let _ = writeln!(lock, "{}", msg);
    let _ = lock.flush();
}

fn park_forever() -> ! {
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}

fn main() {
    let behavior = parse_args();
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Ok(msg) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");

        match method {
            "initialize" => {
                if behavior.hang_init {
                    park_forever();
                }
                respond(
                    Ok(json!({"serverInfo": {"name": "stub_provider"}})),
                    id,
                );
            }
            "tools/list" => {
                if behavior.hang_list {
                    park_forever();
                }
                respond(Ok(list_result(&behavior)), id);
            }
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(Value::Null);
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                if name == "hang" {
                    park_forever();
                }
                if name == "explode" {
                    respond(
                        Err(json!({"code": -32000, "message": "tool exploded"})),
                        id,
                    );
                } else {
                    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                    respond(
                        Ok(json!({"tool": name, "arguments": arguments})),
                        id,
                    );
                }
            }
            "shutdown" => {
                if behavior.ignore_shutdown {
                    continue;
                }
                respond(Ok(Value::Null), id);
                return;
            }
            _ => {
                respond(
                    Err(json!({"code": -32601, "message": format!("unknown method: {}", method)})),
                    id,
                );
            }
        }
    }

    // stdin closed: a cooperative provider exits, a stubborn one parks and
    // waits for a signal
    if behavior.ignore_shutdown {
        park_forever();
    }
}
