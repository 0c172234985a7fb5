use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use gastos_core::controller::ExpenseListController;
use gastos_core::models::UserId;
use gastos_core::store::SqliteStore;

use super::helpers::{NOT_SIGNED_IN, parse_row_number, print_view};
use super::screen::list_controller;

const HELP: &str = "Commands: a = add, e N = edit row N, d N = delete row N, c = account, q = quit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Add,
    Edit(String),
    Delete(String),
    Account,
    Redraw,
    Quit,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let (cmd, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let arg = arg.trim().to_string();
    match cmd {
        "" => Input::Redraw,
        "a" | "add" => Input::Add,
        "e" | "edit" if !arg.is_empty() => Input::Edit(arg),
        "d" | "delete" if !arg.is_empty() => Input::Delete(arg),
        "c" | "account" => Input::Account,
        "q" | "quit" | "exit" => Input::Quit,
        _ => Input::Unknown,
    }
}

/// The interactive home screen: redraws on every snapshot and reads
/// commands from stdin until `q`, end of input, or Ctrl-C.
pub(crate) async fn cmd_watch(store: SqliteStore, user: Option<UserId>, poll: Duration) -> Result<()> {
    let Some(user) = user else {
        eprintln!("{NOT_SIGNED_IN}");
        return Ok(());
    };

    let watcher = store.watch_external_changes(poll)?;
    let mut controller = list_controller(Arc::new(store));
    let result = match controller.subscribe(Some(user.clone())).await {
        Ok(()) => run_screen(&mut controller, &user).await,
        Err(e) => Err(e.into()),
    };
    controller.unsubscribe();
    watcher.abort();
    result
}

async fn run_screen(controller: &mut ExpenseListController, user: &UserId) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{HELP}");

    loop {
        tokio::select! {
            updated = async { controller.next_update().await.is_some() } => {
                if !updated {
                    warn!(path = %user.expenses_path(), "subscription closed by the store");
                    eprintln!("Subscription closed by the store");
                    return Ok(());
                }
                render(controller, user);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if handle_input(controller, parse_input(&line)).await {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted, leaving the list screen");
                return Ok(());
            }
        }
    }
}

fn render(controller: &ExpenseListController, user: &UserId) {
    println!();
    println!("Controle de Gastos ({user})");
    print_view(controller.view());
}

/// Returns true when the user asked to quit.
async fn handle_input(controller: &mut ExpenseListController, input: Input) -> bool {
    match input {
        Input::Quit => return true,
        Input::Add => controller.add(),
        Input::Account => controller.open_account(),
        Input::Redraw => {
            if let Some(user) = controller.user().cloned() {
                render(controller, &user);
            }
        }
        Input::Edit(arg) => match parse_row_number(&arg, controller.view().list.len()) {
            Ok(idx) => {
                let record = controller.view().list[idx].clone();
                // A missing id has already been reported to the user.
                let _ = controller.edit(&record);
            }
            Err(e) => eprintln!("{e}"),
        },
        Input::Delete(arg) => match parse_row_number(&arg, controller.view().list.len()) {
            Ok(idx) => {
                let id = controller.view().list[idx].id.clone();
                // Failures are reported through the notifier; the list
                // updates when the store sends its next snapshot.
                let _ = controller.delete(id.as_deref()).await;
            }
            Err(e) => eprintln!("{e}"),
        },
        Input::Unknown => eprintln!("{HELP}"),
    }
    false
}
