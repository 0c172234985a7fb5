mod account;
mod expense;
mod helpers;
mod screen;
mod watch;

pub(crate) use account::{cmd_account_login, cmd_account_logout, cmd_account_show};
pub(crate) use expense::{cmd_add, cmd_delete, cmd_edit, cmd_import, cmd_list};
pub(crate) use watch::cmd_watch;
