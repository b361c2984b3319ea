use clap::{Arg, Command};
use serde_json::{json, Value};
use vcr_proxy_core::CassetteStore;

fn main() {
    let matches = Command::new("vcr-inspect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and manage VCR cassettes")
        .subcommand(
            Command::new("list")
                .about("List cassettes under a cassettes directory")
                .arg(
                    Arg::new("cassettes_dir")
                        .help("Path to the cassettes root directory")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("domain")
                        .help("Restrict listing to a single domain")
                        .long("domain")
                        .short('d'),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print a single cassette file as JSON")
                .arg(
                    Arg::new("cassette")
                        .help("Path to the cassette file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("field")
                .about("Extract a field path from a cassette (e.g. 'request.method', 'response.status_code')")
                .arg(
                    Arg::new("cassette")
                        .help("Path to the cassette file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("field")
                        .help("Field path to extract")
                        .required(true)
                        .index(2),
                ),
        )
        .subcommand(
            Command::new("fields")
                .about("List all available field paths in a cassette")
                .arg(
                    Arg::new("cassette")
                        .help("Path to the cassette file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a single cassette, a domain's cassettes, or everything")
                .arg(
                    Arg::new("cassettes_dir")
                        .help("Path to the cassettes root directory")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("domain")
                        .help("Domain to delete from")
                        .long("domain")
                        .short('d'),
                )
                .arg(
                    Arg::new("cassette_id")
                        .help("Filename stem of a single cassette to delete")
                        .long("id"),
                )
                .arg(
                    Arg::new("all")
                        .help("Delete every cassette under the cassettes directory")
                        .long("all")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("list", sub)) => {
            let dir = sub.get_one::<String>("cassettes_dir").unwrap();
            let domain = sub.get_one::<String>("domain");
            list_cassettes(dir, domain.map(String::as_str))
        }
        Some(("show", sub)) => {
            let path = sub.get_one::<String>("cassette").unwrap();
            show_cassette(path)
        }
        Some(("field", sub)) => {
            let path = sub.get_one::<String>("cassette").unwrap();
            let field_path = sub.get_one::<String>("field").unwrap();
            extract_field(path, field_path)
        }
        Some(("fields", sub)) => {
            let path = sub.get_one::<String>("cassette").unwrap();
            list_fields(path)
        }
        Some(("delete", sub)) => {
            let dir = sub.get_one::<String>("cassettes_dir").unwrap();
            let domain = sub.get_one::<String>("domain");
            let cassette_id = sub.get_one::<String>("cassette_id");
            let all = sub.get_flag("all");
            delete(dir, domain.map(String::as_str), cassette_id.map(String::as_str), all)
        }
        _ => {
            eprintln!("No subcommand provided. Use --help for usage information.");
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn load_cassette(path: &str) -> Result<vcr_proxy_core::Cassette, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse {path}: {e}"))
}

fn list_cassettes(cassettes_dir: &str, domain: Option<&str>) -> Result<(), String> {
    let store = CassetteStore::new(cassettes_dir);
    let paths = match domain {
        Some(domain) => store.list(domain),
        None => store.list_all(),
    };

    let entries: Vec<Value> = paths
        .iter()
        .map(|p| json!({ "path": p.to_string_lossy() }))
        .collect();

    println!(
        "{}",
        serde_json::to_string(&json!({ "total": entries.len(), "cassettes": entries })).unwrap()
    );
    Ok(())
}

fn show_cassette(path: &str) -> Result<(), String> {
    let cassette = load_cassette(path)?;
    println!("{}", serde_json::to_string(&cassette).map_err(|e| e.to_string())?);
    Ok(())
}

fn extract_field(path: &str, field_path: &str) -> Result<(), String> {
    let cassette = load_cassette(path)?;
    let cassette_json = serde_json::to_value(&cassette).map_err(|e| e.to_string())?;
    let value = extract_nested_field(&cassette_json, field_path)?;
    print_value(&value);
    Ok(())
}

fn extract_nested_field(value: &Value, field_path: &str) -> Result<Value, String> {
    let mut current = value;
    for part in field_path.split('.') {
        match current {
            Value::Object(map) => {
                current = map
                    .get(part)
                    .ok_or_else(|| format!("field '{part}' not found in object"))?;
            }
            _ => return Err(format!("cannot access field '{part}' on non-object value")),
        }
    }
    Ok(current.clone())
}

fn print_value(value: &Value) {
    match value {
        Value::String(s) => print!("{s}"),
        _ => print!("{}", serde_json::to_string(value).unwrap()),
    }
}

fn list_fields(path: &str) -> Result<(), String> {
    let cassette = load_cassette(path)?;
    let cassette_json = serde_json::to_value(&cassette).map_err(|e| e.to_string())?;

    let mut field_paths = Vec::new();
    collect_field_paths(&cassette_json, "", &mut field_paths);

    println!(
        "{}",
        serde_json::to_string(&json!({ "field_paths": field_paths })).unwrap()
    );
    Ok(())
}

fn collect_field_paths(value: &Value, current_path: &str, paths: &mut Vec<String>) {
    if let Value::Object(map) = value {
        for (key, val) in map {
            let new_path = if current_path.is_empty() {
                key.clone()
            } else {
                format!("{current_path}.{key}")
            };
            paths.push(new_path.clone());
            collect_field_paths(val, &new_path, paths);
        }
    }
}

fn delete(cassettes_dir: &str, domain: Option<&str>, cassette_id: Option<&str>, all: bool) -> Result<(), String> {
    let store = CassetteStore::new(cassettes_dir);

    let removed = match (all, domain, cassette_id) {
        (true, _, _) => store.delete_all(),
        (false, Some(domain), Some(id)) => usize::from(store.delete(domain, id)),
        (false, Some(domain), None) => store.delete_domain(domain),
        (false, None, _) => return Err("specify --all, --domain, or --domain with --id".to_string()),
    };

    println!("{}", serde_json::to_string(&json!({ "removed": removed })).unwrap());
    Ok(())
}
