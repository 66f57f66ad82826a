//! Progress bar styling
// (c) 2024 sendplz contributors

use console::Term;
use indicatif::{MultiProgress, ProgressBar, ProgressFinish, ProgressStyle};

/// Redraw limit for the sender's display
pub(crate) const MAX_UPDATE_FPS: u8 = 20;

const PROGRESS_STYLE_COMPACT: &str =
    "{msg:.dim} {wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec} [{percent}%/{decimal_total_bytes:.dim}]";

// report.txt [==========================            ] 2m30s @ 123.4MB/s [70%/1.24GB]
// The readout needs about 35 columns and a useful bar about 20.
const DATA_AND_PROGRESS: usize = 55;

// a-very-long-filename-indeed.tar.gz                                  [70%/1.24GB]
// [==========================                                  ] 2m30s @ 123.4MB/s
const PROGRESS_STYLE_OVERLONG: &str =
    "{wide_msg:.dim} [{percent}%/{decimal_total_bytes:.dim}]\n{wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec}";

// Size not known
const PROGRESS_STYLE_UNSIZED: &str =
    "{spinner} {msg:.dim} {decimal_bytes:.cyan} @ {decimal_bytes_per_sec} {elapsed}";

fn style_for(terminal: &Term, filename: &str, sized: bool) -> &'static str {
    if !sized {
        return PROGRESS_STYLE_UNSIZED;
    }
    // size() returns a reasonable default if it can't detect
    let term_width = terminal.size().1 as usize;
    if filename.len() + DATA_AND_PROGRESS > term_width {
        PROGRESS_STYLE_OVERLONG
    } else {
        PROGRESS_STYLE_COMPACT
    }
}

/// Creates a progress bar for sending a file. Without a display, the bar is hidden.
pub(crate) fn progress_bar_for(
    display: Option<&MultiProgress>,
    filename: &str,
    size: Option<u64>,
) -> anyhow::Result<ProgressBar> {
    let Some(display) = display else {
        return Ok(ProgressBar::hidden());
    };
    let style = ProgressStyle::with_template(style_for(
        &Term::stderr(),
        filename,
        size.is_some(),
    ))?;
    let bar = size.map_or_else(ProgressBar::no_length, ProgressBar::new);
    Ok(display.add(
        bar.with_style(style)
            .with_message(filename.to_owned())
            .with_finish(ProgressFinish::AndClear),
    ))
}
