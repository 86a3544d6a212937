use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static FOREGROUND_CHILDREN: AtomicUsize = AtomicUsize::new(0);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_interrupt(_: nix::libc::c_int) {
    // A child sharing the terminal got the same SIGINT; let it decide.
    if FOREGROUND_CHILDREN.load(Ordering::SeqCst) > 0 {
        return;
    }
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Ctrl-C cancels the tool, except while an interactive child
/// (journalctl -f, systemctl status) owns the terminal.
///
/// The handler only raises a flag. It is installed without `SA_RESTART`, so a
/// blocking read on stdin fails with `EINTR` and the prompt sees the flag;
/// the program then unwinds normally and flushes its logs.
pub fn install_interrupt_handler() -> anyhow::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &action) }
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
    Ok(())
}

/// Whether Ctrl-C was pressed outside an interactive child.
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Marks an interactive child as running for as long as the guard lives.
pub struct ForegroundChild(());

impl ForegroundChild {
    #[must_use]
    pub fn enter() -> Self {
        FOREGROUND_CHILDREN.fetch_add(1, Ordering::SeqCst);
        Self(())
    }
}

impl Drop for ForegroundChild {
    fn drop(&mut self) {
        FOREGROUND_CHILDREN.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::{ForegroundChild, FOREGROUND_CHILDREN};

    #[test]
    fn foreground_guard_counts_nested_children() {
        let before = FOREGROUND_CHILDREN.load(Ordering::SeqCst);
        let outer = ForegroundChild::enter();
        let inner = ForegroundChild::enter();
        assert!(FOREGROUND_CHILDREN.load(Ordering::SeqCst) >= before + 2);
        drop(inner);
        drop(outer);
        assert!(FOREGROUND_CHILDREN.load(Ordering::SeqCst) <= before + 2);
    }
}
