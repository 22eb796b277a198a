//! CLI tool for bootstrap user administration.
//!
//! Usage:
//!   cargo run --bin manage-users -- create-superuser --username admin --email admin@example.com
//!   cargo run --bin manage-users -- list-keys
//!   cargo run --bin manage-users -- revoke-key --id <key-id>

use std::env;

use uuid::Uuid;

use moztrap_lib::config::Config;
use moztrap_lib::db::{DbPool, users};
use moztrap_lib::error::AppError;
use moztrap_lib::forms::users::CreateUserForm;
use moztrap_lib::models::ApiKeyListItem;
use moztrap_lib::models::user::CreateUserRequest;
use moztrap_lib::services::api_key;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }
    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

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

    match command {
        "create-superuser" => create_superuser(&pool, &config, &args).await,
        "list-keys" | "ls" => list_keys(&pool).await,
        "revoke-key" => {
            let id = match flag_value(&args, "--id").map(|v| Uuid::parse_str(&v)) {
                Some(Ok(id)) => id,
                Some(Err(e)) => {
                    eprintln!("Error: invalid --id: {}", e);
                    std::process::exit(1);
                }
                None => {
                    eprintln!("Error: --id is required");
                    std::process::exit(1);
                }
            };
            revoke_key(&pool, id).await;
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .skip(1)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
}

async fn create_superuser(pool: &DbPool, config: &Config, args: &[String]) {
    // Prefer the environment so the password stays out of shell history.
    let password = env::var("MT_SUPERUSER_PASSWORD")
        .ok()
        .or_else(|| flag_value(args, "--password"));

    let form = CreateUserForm(CreateUserRequest {
        username: flag_value(args, "--username"),
        email: flag_value(args, "--email"),
        password,
        first_name: String::new(),
        last_name: String::new(),
        is_superuser: true,
        roles: Vec::new(),
    });

    match form.save(pool.connection(), config.password_hash_cost).await {
        Ok(user) => {
            println!("Superuser {} created ({}).", user.username, user.id);
            if !user.has_usable_password() {
                println!("No password set; issue an API key with generate-api-key to sign in.");
            }
        }
        Err(AppError::Validation(errors)) => {
            eprintln!("Error: {}", errors.summary());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error creating user: {}", e);
            std::process::exit(1);
        }
    }
}

async fn list_keys(pool: &DbPool) {
    let keys = match api_key::list_keys(pool).await {
        Ok(k) => k,
        Err(e) => {
            eprintln!("Error listing keys: {}", e);
            std::process::exit(1);
        }
    };

    if keys.is_empty() {
        println!("No API keys found.");
        return;
    }

    println!();
    println!(
        "{:<36} {:<10} {:<20} {:<10}",
        "ID", "PREFIX", "OWNER", "STATUS"
    );
    println!("{}", "─".repeat(78));

    for key in keys {
        let item = ApiKeyListItem::from(key);
        let status = if item.is_revoked { "revoked" } else { "active" };
        let owner = match users::find_by_id(pool.connection(), item.owner_id).await {
            Ok(Some(u)) => u.username,
            _ => item.owner_id.to_string(),
        };
        println!(
            "{:<36} {:<10} {:<20} {:<10}",
            item.id, item.key_prefix, owner, status
        );
    }
    println!();
}

async fn revoke_key(pool: &DbPool, id: Uuid) {
    match api_key::revoke_key(pool, id).await {
        Ok(true) => println!("API key {} revoked.", id),
        Ok(false) => {
            eprintln!("API key {} not found or already revoked.", id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error revoking key: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: manage-users <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  create-superuser --username <name> --email <email> [--password <pw>]");
    eprintln!("                        Create an active superuser (password may also come");
    eprintln!("                        from MT_SUPERUSER_PASSWORD)");
    eprintln!("  list-keys, ls         List all API keys");
    eprintln!("  revoke-key --id <id>  Revoke an API key");
    eprintln!("  help                  Show this help");
    eprintln!();
}
