//! CLI tool to issue an API key for an existing user.
//!
//! Usage:
//!   cargo run --bin generate-api-key -- --username alice

use std::env;

use moztrap_lib::config::Config;
use moztrap_lib::db::{DbPool, users};
use moztrap_lib::services::api_key;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    let mut username: Option<String> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--username" | "-u" => {
                i += 1;
                if i < args.len() {
                    username = Some(args[i].clone());
                }
            }
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(username) = username else {
        eprintln!("Error: --username is required");
        print_usage();
        std::process::exit(1);
    };

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match DbPool::new(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error connecting to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = pool.run_migrations().await {
        eprintln!("Error running migrations: {}", e);
        std::process::exit(1);
    }

    let owner = match users::find_by_username(pool.connection(), &username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            eprintln!("Error: no user named '{}'", username);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error looking up user: {}", e);
            std::process::exit(1);
        }
    };
    if !owner.is_active {
        eprintln!(
            "Warning: '{}' is inactive; the key will not authenticate until the account is activated",
            owner.username
        );
    }

    let (full_key, key) = match api_key::create_key(&pool, owner.id, None).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error generating key: {}", e);
            std::process::exit(1);
        }
    };

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("  API Key Generated");
    println!("════════════════════════════════════════════════════════════════");
    println!();
    println!("  ID:      {}", key.id);
    println!("  User:    {} ({})", owner.username, owner.id);
    println!("  Prefix:  {}", key.key_prefix);
    println!();
    println!("  Key:     {}", full_key);
    println!();
    println!("  Save this key! It cannot be retrieved later.");
    println!("════════════════════════════════════════════════════════════════");
    println!();
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: generate-api-key --username <username>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --username, -u    User the key authenticates as (required)");
    eprintln!("  --help, -h        Show this help");
    eprintln!();
    eprintln!("Send the key in the X-API-Key header.");
    eprintln!();
}
