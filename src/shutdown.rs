//! Process-wide interrupt flag, set from the signal (or console control)
//! handler and polled by the capture loop between frames.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn flag() -> &'static AtomicBool {
    &SHUTDOWN
}

/// Routes Ctrl+C (and SIGTERM) to the shutdown flag. The handler resets itself
/// after firing, so a second Ctrl+C terminates immediately.
#[cfg(unix)]
pub fn install_interrupt_handler() {
    extern "C" fn handle_signal(_: libc::c_int) {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }

    for signal in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe; `action` is fully initialised before use.
        let installed = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESETHAND;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signal, &action, std::ptr::null_mut()) == 0
        };
        if !installed {
            log::warn!("Could not install handler for signal {}", signal);
        }
    }
}

#[cfg(windows)]
pub fn install_interrupt_handler() {
    #[link(name = "kernel32")]
    extern "system" {
        fn SetConsoleCtrlHandler(
            handler: Option<unsafe extern "system" fn(u32) -> i32>,
            add: i32,
        ) -> i32;
    }

    unsafe extern "system" fn ctrl_handler(ctrl_type: u32) -> i32 {
        match ctrl_type {
            // CTRL_C_EVENT, CTRL_BREAK_EVENT
            0 | 1 => {
                SHUTDOWN.store(true, Ordering::SeqCst);
                1
            }
            _ => 0,
        }
    }

    // SAFETY: registers a handler that only performs an atomic store.
    if unsafe { SetConsoleCtrlHandler(Some(ctrl_handler), 1) } == 0 {
        log::warn!("Could not install console control handler");
    }
}

#[cfg(not(any(unix, windows)))]
pub fn install_interrupt_handler() {
    log::warn!("Interrupt handling not supported on this platform");
}
