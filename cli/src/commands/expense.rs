use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{error, warn};

use gastos_core::error::ListError;
use gastos_core::models::{ExpenseDocument, NewExpense, UpdateExpense, UserId, format_amount};
use gastos_core::store::SqliteStore;

use super::helpers::{NOT_SIGNED_IN, ViewJson, json_error, parse_date, print_view, require_user};
use super::screen::list_controller;

pub(crate) async fn cmd_list(store: SqliteStore, user: Option<UserId>, json: bool) -> Result<()> {
    let mut controller = list_controller(Arc::new(store));
    controller.subscribe(user).await?;

    if !controller.is_subscribed() {
        if json {
            println!("{}", json_error(NOT_SIGNED_IN));
        } else {
            eprintln!("{NOT_SIGNED_IN}");
        }
        return Ok(());
    }

    let view = controller
        .next_update()
        .await
        .context("Store closed the subscription before the first snapshot")?
        .clone();
    controller.unsubscribe();

    if json {
        println!("{}", serde_json::to_string_pretty(&ViewJson::from(&view))?);
    } else {
        print_view(&view);
    }
    Ok(())
}

pub(crate) fn cmd_add(
    store: &SqliteStore,
    user: Option<UserId>,
    description: &str,
    value: f64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let user = require_user(user)?;
    let expense = NewExpense {
        description: description.to_string(),
        value,
        date: parse_date(date)?,
    };
    let record = store.add_expense(&user, &expense)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "id": record.id,
                "description": record.description,
                "value": record.amount(),
                "date": record.date.display(),
            })
        );
    } else {
        let id = record.id.as_deref().unwrap_or("?");
        println!(
            "Added {} {} on {} (id {id})",
            record.description,
            format_amount(record.amount()),
            record.date.display()
        );
    }
    Ok(())
}

pub(crate) fn cmd_edit(
    store: &SqliteStore,
    user: Option<UserId>,
    id: &str,
    description: Option<String>,
    value: Option<f64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let user = require_user(user)?;
    if description.is_none() && value.is_none() && date.is_none() {
        bail!("Nothing to update. Provide at least one of --description, --value, or --date");
    }
    let update = UpdateExpense {
        description,
        value,
        date: date.map(Some).map(parse_date).transpose()?,
    };

    if let Err(e) = store.get_expense(&user, id) {
        warn!(path = %user.expenses_path(), id, "edit target missing: {e:#}");
        if json {
            println!("{}", json_error(&format!("Expense {id} not found")));
        } else {
            eprintln!("Expense {id} not found");
        }
        process::exit(2);
    }

    let record = store.update_expense(&user, id, &update)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "id": record.id,
                "description": record.description,
                "value": record.amount(),
                "date": record.date.display(),
            })
        );
    } else {
        println!(
            "Updated expense {id}: {} {} on {}",
            record.description,
            format_amount(record.amount()),
            record.date.display()
        );
    }
    Ok(())
}

/// Delete through the list controller, then wait for the store's next
/// snapshot to report the new total.
pub(crate) async fn cmd_delete(
    store: SqliteStore,
    user: Option<UserId>,
    id: &str,
    json: bool,
) -> Result<()> {
    let mut controller = list_controller(Arc::new(store));
    controller.subscribe(user).await?;
    if controller.is_subscribed() {
        controller.next_update().await;
    }

    match controller.delete(Some(id)).await {
        Ok(()) => {}
        Err(ListError::Unauthenticated) => bail!(NOT_SIGNED_IN),
        Err(e) => {
            error!(id, "delete command failed: {e}");
            if json {
                println!("{}", json_error(&e.to_string()));
            }
            process::exit(2);
        }
    }

    controller.next_update().await;
    let total = controller.formatted_total();
    controller.unsubscribe();

    if json {
        println!("{}", serde_json::json!({ "deleted": id, "total": total }));
    } else {
        println!("Deleted expense {id}. Total de Gastos: {total}");
    }
    Ok(())
}

pub(crate) fn cmd_import(
    store: &SqliteStore,
    user: Option<UserId>,
    file: &Path,
    json: bool,
) -> Result<()> {
    let user = require_user(user)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let docs: Vec<ExpenseDocument> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of objects", file.display()))?;

    let count = store.import_documents(&user, &docs)?;
    if json {
        println!("{}", serde_json::json!({ "imported": count }));
    } else {
        println!("Imported {count} expenses into {}", user.expenses_path());
    }
    Ok(())
}
