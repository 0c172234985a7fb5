use anyhow::Result;

use gastos_core::models::UserId;

use crate::config::Config;

pub(crate) fn cmd_account_login(config: &Config, user: &str, json: bool) -> Result<()> {
    let user = UserId::parse(user)?;
    config.save_session(&user)?;
    if json {
        println!("{}", serde_json::json!({ "user": user }));
    } else {
        println!("Signed in as {user}");
    }
    Ok(())
}

pub(crate) fn cmd_account_logout(config: &Config, json: bool) -> Result<()> {
    let removed = config.clear_session()?;
    if json {
        println!("{}", serde_json::json!({ "signed_out": removed }));
    } else if removed {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

fn account_summary(config: &Config, user: Option<&UserId>) -> serde_json::Value {
    serde_json::json!({
        "user": user,
        "collection": user.map(UserId::expenses_path),
        "database": config.db_path.display().to_string(),
    })
}

pub(crate) fn cmd_account_show(config: &Config, user: Option<&UserId>, json: bool) -> Result<()> {
    if json {
        println!("{}", account_summary(config, user));
        return Ok(());
    }
    match user {
        Some(user) => {
            println!("Signed in as {user}");
            println!("Collection: {}", user.expenses_path());
        }
        None => println!("Not signed in"),
    }
    println!("Database: {}", config.db_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reports_overridden_database() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("other.db");
        let config = Config::from_data_dir(dir.path().join("data"))
            .unwrap()
            .with_db_override(Some(other.clone()));
        let alice = UserId::parse("alice").unwrap();

        let summary = account_summary(&config, Some(&alice));
        assert_eq!(summary["database"], other.display().to_string());
        assert_eq!(summary["collection"], "users/alice/expenses");

        let summary = account_summary(&config, None);
        assert!(summary["user"].is_null());
    }
}
