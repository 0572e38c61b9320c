use crate::scene::Scene;
use anyhow::Result;

/// What a command asks the queue to do with it after it ran. One-shot
/// entries are removed regardless; a persistent entry stays queued until it
/// returns `Done` or is deactivated by token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFate {
    Done,
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandToken(u64);

pub type CommandAction = Box<dyn FnMut(&mut Scene) -> Result<CommandFate>>;

pub(crate) struct CommandEntry {
    pub id: u64,
    pub persistent: bool,
    pub action: CommandAction,
}

/// Deferred command queue. Mutations scheduled here run at the next frame
/// flush, in registration order; actions scheduled during a flush are held
/// back until the following one. The flush itself lives on `Scene`, which
/// checks the batch out of this queue so actions can borrow the scene.
#[derive(Default)]
pub struct CommandQueue {
    entries: Vec<CommandEntry>,
    cancelled: Vec<u64>,
    next_id: u64,
    pub(crate) flushing: bool,
}

impl CommandQueue {
    pub fn schedule(
        &mut self,
        persistent: bool,
        action: impl FnMut(&mut Scene) -> Result<CommandFate> + 'static,
    ) -> CommandToken {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(CommandEntry { id, persistent, action: Box::new(action) });
        CommandToken(id)
    }

    /// Marks an entry for removal at the next flush. Safe to call with a
    /// token whose entry already ran and was removed.
    pub fn deactivate(&mut self, token: CommandToken) {
        self.cancelled.push(token.0);
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn take_batch(&mut self) -> Vec<CommandEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Puts survivors back in front of anything scheduled mid-flush.
    pub(crate) fn restore(&mut self, mut survivors: Vec<CommandEntry>) {
        let scheduled_during_flush = std::mem::take(&mut self.entries);
        survivors.extend(scheduled_during_flush);
        self.entries = survivors;
    }

    pub(crate) fn consume_cancellation(&mut self, id: u64) -> bool {
        if let Some(index) = self.cancelled.iter().position(|&cancelled| cancelled == id) {
            self.cancelled.swap_remove(index);
            return true;
        }
        false
    }
}
