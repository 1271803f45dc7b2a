use std::fmt;

use colored::Colorize;
use dialoguer::{console::Term, theme::ColorfulTheme, MultiSelect, Select};
use error_stack::{IntoReport, ResultExt};

#[derive(Debug)]
pub struct DialoguerError;

impl fmt::Display for DialoguerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dialoguer error")
    }
}

impl std::error::Error for DialoguerError {}

pub type DialoguerResult<T> = error_stack::Result<T, DialoguerError>;

#[derive(Debug, Clone)]
pub struct Dialoguer;

impl Dialoguer {
    /// Loops until at least one item is picked when `force_select` is set.
    pub fn multiselect<T>(
        prompt_text: String,
        items: Vec<T>,
        defaults: Option<&[bool]>,
        force_select: bool,
    ) -> DialoguerResult<Vec<usize>>
    where
        T: ToString,
    {
        loop {
            let colorful_theme = ColorfulTheme::default();
            let mut multi_select = MultiSelect::with_theme(&colorful_theme);
            let mut dialog = multi_select.with_prompt(&prompt_text).items(&items);
            if let Some(defaults) = defaults {
                dialog = dialog.defaults(defaults);
            }
            let selection = dialog
                .interact_on_opt(&Term::stderr())
                .into_report()
                .change_context(DialoguerError)?
                .ok_or(DialoguerError)
                .into_report()
                .attach_printable("Selection cancelled")?;
            if force_select && selection.is_empty() {
                println!(
                    "{}",
                    "No option selected, pick at least one with the space bar".red()
                );
                continue;
            }
            return Ok(selection);
        }
    }

    pub fn select<T>(prompt_text: String, items: Vec<T>, default: Option<usize>) -> DialoguerResult<usize>
    where
        T: ToString,
    {
        let colorful_theme = ColorfulTheme::default();
        let mut select = Select::with_theme(&colorful_theme);
        let dialog = select
            .with_prompt(&prompt_text)
            .items(&items)
            .default(default.unwrap_or(0));

        dialog
            .interact_on_opt(&Term::stderr())
            .into_report()
            .change_context(DialoguerError)?
            .ok_or(DialoguerError)
            .into_report()
            .attach_printable("Selection cancelled")
    }

    pub fn select_yes_or_no(prompt_text: String) -> DialoguerResult<bool> {
        let colorful_theme = ColorfulTheme::default();
        let mut select = Select::with_theme(&colorful_theme);
        let dialog = select
            .with_prompt(&prompt_text)
            .item("yes")
            .item("no")
            .default(0);
        let selection = dialog
            .interact_on_opt(&Term::stderr())
            .into_report()
            .change_context(DialoguerError)?
            .ok_or(DialoguerError)
            .into_report()?;

        Ok(selection == 0)
    }
}
