// (c) 2024 sendplz contributors
//! Terminal styling for help and error output
//!
//! Print styled text with anstream's `println!` / `eprintln!`, which strip the styling when
//! the output is not a terminal.

#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use anstyle::Style;
use clap::builder::styling::Styles;

pub(crate) const ERROR: Style = Style::new().bold().fg_color(Some(Ansi(Red)));
const WARNING: Style = Style::new().bold().fg_color(Some(Ansi(Yellow)));
const PLACEHOLDER: Style = Style::new().fg_color(Some(Ansi(Green)));
const HEADING: Style = Style::new().bold().underline();

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(HEADING)
    .header(HEADING)
    .literal(Style::new().bold().fg_color(Some(Ansi(Cyan))))
    .invalid(WARNING)
    .error(ERROR)
    .valid(PLACEHOLDER.bold())
    .placeholder(PLACEHOLDER);
