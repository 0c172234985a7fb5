use std::sync::Arc;

use gastos_core::controller::{ExpenseListController, Navigator, Notice, Notifier, Route};
use gastos_core::store::ExpenseStore;

/// The terminal has no screens to switch to; tell the user which command
/// opens the requested one instead.
pub(crate) struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        eprintln!("{}", route_hint(&route));
    }
}

pub(crate) fn route_hint(route: &Route) -> String {
    match route {
        Route::Add => {
            "Add: gastos add <description> <value> [--date YYYY-MM-DD]".to_string()
        }
        Route::Edit { id } => format!(
            "Edit: gastos edit {id} [--description <text>] [--value <n>] [--date YYYY-MM-DD]"
        ),
        Route::Account => {
            "Account: gastos account show | login <user> | logout".to_string()
        }
    }
}

pub(crate) struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: Notice) {
        eprintln!("{}: {}", notice.title, notice.message);
    }
}

pub(crate) fn list_controller(store: Arc<dyn ExpenseStore>) -> ExpenseListController {
    ExpenseListController::new(store, Arc::new(TerminalNavigator), Arc::new(TerminalNotifier))
}
