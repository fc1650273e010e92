use anyhow::{Context, Result};
use indoc::indoc;
use log::{info, warn};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the generated configuration file
pub const TEMPLATE_FILE: &str = "dbmanager.yaml";

const TEMPLATE: &str = indoc! {r#"
    connection:
      # postgres or mysql
      type: postgres
      host: ${POSTGRES_HOST:localhost}
      port: 5432
      username: ${POSTGRES_USER:postgres}
      password: ${POSTGRES_PASSWORD:postgres}
      database: postgres
      # disable, prefer, require or verify-full
      sslmode: disable

    databases:
      - name: app
        owner: app_owner
        default_privileges:
          - role: app_owner
            schema: public
            privileges: [SELECT, INSERT, UPDATE, DELETE]
            on: tables
            to: app_user

    roles:
      - name: app_owner

      - name: readers
        grants:
          - database: app
            schema: public
            privileges: [USAGE]
          - database: app
            schema: public
            table: "*"
            privileges: [SELECT]

      - name: app_user
        password: ${APP_USER_PASSWORD:change-me}
        grants:
          - database: app
            privileges: [CONNECT, TEMP]
        roles:
          - readers
"#};

/// Write the template configuration into `target`, never overwriting an
/// existing file.
pub fn gen(target: &Path) -> Result<PathBuf> {
    let file = target.join(TEMPLATE_FILE);

    if file.exists() {
        warn!("target already exists: {}", file.display());
        return Ok(file);
    }

    fs::create_dir_all(target)
        .with_context(|| format!("failed to create {}", target.display()))?;
    fs::write(&file, TEMPLATE).with_context(|| format!("failed to write {}", file.display()))?;

    info!("Generated to {}", file.display());

    Ok(file)
}

/// Random password of the given length
pub fn random_password(length: u8) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789)(*&^%$#@!~";

    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Postgres MD5 password hash: "md5" followed by md5(password || username)
pub fn md5_password(username: &str, password: &str) -> String {
    format!("md5{:x}", md5::compute(format!("{}{}", password, username)))
}

/// Print a password, generated unless given, and its MD5 hash for `username`
pub fn gen_password(length: u8, username: Option<String>, password: Option<String>) {
    let password = password.unwrap_or_else(|| random_password(length));
    println!("Generated password: {}", password);

    match username {
        Some(username) => println!(
            "Generated MD5 (user: {}): {}",
            username,
            md5_password(&username, &password)
        ),
        None => println!("Hint: Please provide --username to generate MD5"),
    }
}
