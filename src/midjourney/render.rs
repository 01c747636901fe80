//! Markdown rendering for image tasks.
//!
//! ````text
//! ```progress
//! 0
//! ...
//! 100
//! ```
//! ![image](...)
//!
//! [U1](...) [U2](...) [U3](...) [U4](...)
//!
//! [V1](...) [V2](...) [V3](...) [V4](...)
//!
//! [REROLL](...)
//! ````

use crate::constants::MAX_ACTIONS;
use crate::midjourney::prompt::TaskAction;
use crate::str_utils::image_markdown;
use crate::types::Result;

pub const PROGRESS_OPEN: &str = "```progress\n";
pub const PROGRESS_CLOSE: &str = "```\n";

/// Pseudo-URL for a follow-up command: spaces become hyphens, so
/// `/UPSCALE 42 1` turns into `<host>/UPSCALE-42-1`.
pub fn virtual_link(host: &str, command: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), command.replace(' ', "-"))
}

fn links(host: &str, task_id: &str, action: TaskAction, label: &str) -> String {
    (1..=MAX_ACTIONS)
        .map(|index| {
            let command = format!("{} {} {}", action.command(), task_id, index);
            format!("[{}{}]({})", label, index, virtual_link(host, &command))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upscale and variation links for every grid cell, plus one reroll link.
pub fn action_links(host: &str, task_id: &str) -> String {
    let upscale = links(host, task_id, TaskAction::Upscale, "U");
    let variation = links(host, task_id, TaskAction::Variation, "V");
    let reroll = format!(
        "[REROLL]({})",
        virtual_link(host, &format!("{} {}", TaskAction::Reroll.command(), task_id))
    );
    format!("\n\n{}\n\n{}\n\n{}\n", upscale, variation, reroll)
}

/// Output state for one task.
///
/// Polls are at-least-once: repeated progress values are dropped, and once the
/// block is closed or the result rendered, later terminal notifications are
/// no-ops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgressRenderer {
    opened: bool,
    closed: bool,
    last: Option<u8>,
    completed: bool,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.opened && !self.closed
    }

    /// Renders one progress tick. The block opens on the first value seen,
    /// whatever it is, and closes right after `100`.
    pub fn on_progress<H>(&mut self, progress: u8, hook: &mut H) -> Result<()>
    where
        H: FnMut(&str) -> Result<()>,
    {
        let progress = progress.min(100);
        if self.closed || self.last == Some(progress) {
            return Ok(());
        }

        if !self.opened {
            hook(PROGRESS_OPEN)?;
            self.opened = true;
        }
        hook(&format!("{}\n", progress))?;
        self.last = Some(progress);

        if progress == 100 {
            hook(PROGRESS_CLOSE)?;
            self.closed = true;
        }
        Ok(())
    }

    /// Closes a block left open by a task that stopped early, so whatever the
    /// caller writes next lands outside the fence.
    pub fn finish<H>(&mut self, hook: &mut H) -> Result<()>
    where
        H: FnMut(&str) -> Result<()>,
    {
        if !self.is_open() {
            return Ok(());
        }
        self.closed = true;
        hook(PROGRESS_CLOSE)
    }

    /// Renders the result image and, unless the finished task was an upscale,
    /// the follow-up links. Returns `false` when the result was already rendered.
    pub fn on_complete<H>(
        &mut self,
        action: TaskAction,
        task_id: &str,
        image_url: &str,
        host: &str,
        hook: &mut H,
    ) -> Result<bool>
    where
        H: FnMut(&str) -> Result<()>,
    {
        if self.completed {
            tracing::debug!("[MIDJOURNEY] Duplicate completion for task {} ignored", task_id);
            return Ok(false);
        }
        self.completed = true;

        hook(&image_markdown(image_url))?;
        if action != TaskAction::Upscale {
            hook(&action_links(host, task_id))?;
        }
        Ok(true)
    }
}
