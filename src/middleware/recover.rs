//! Panic recovery guard.
//!
//! The outermost step. A panic anywhere further down the chain is caught,
//! logged on target `fatal` with a bounded backtrace, and turned into
//!
//! ```json
//! {"msg":"service busy","detail":"RECOVER"}
//! ```
//!
//! with status 500. The connection and the process keep serving.
//!
//! By the time `catch_unwind` returns, the panicking frames are gone. A panic
//! hook (installed once per process) records the backtrace at the panic site
//! into a thread-local, and the guard picks it up from there. Polling the
//! guarded future and unwinding happen on the same thread, so the slot read
//! is the one the hook wrote. Frames of the hook and the panic runtime are
//! dropped so the bounded stack starts at the panic site.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use async_trait::async_trait;
use futures::FutureExt;

use crate::envelope::Envelope;
use crate::logging::ContextLogger;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

/// Bytes of backtrace kept in the fatal log entry.
pub const STACK_LIMIT: usize = 2 << 10;

pub const RECOVER_TAG: &str = "RECOVER";

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the backtrace-recording panic hook. Idempotent. The previously
/// installed hook still runs after recording.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = LAST_PANIC.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(from_panic_site(&trace).to_owned());
                }
            });
            previous(info);
        }));
    });
}

#[derive(Clone, Copy, Debug)]
pub struct Recover {
    stack_limit: usize,
}

impl Recover {
    /// Also installs the panic hook.
    pub fn new() -> Self {
        install_panic_hook();
        Self { stack_limit: STACK_LIMIT }
    }
}

impl Default for Recover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for Recover {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let trace_id = req.context().trace_slot();
        let identity = req.context().identity_slot();
        let route = format!("{}{}", req.method(), req.path());

        match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(res) => res,
            Err(payload) => {
                // Nothing in here may unwind past the guard.
                let _ = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    let stack = take_stack(self.stack_limit);
                    let fault = describe(payload.as_ref());
                    ContextLogger::new(trace_id.get(), Some(&route), identity.primary_id()).fatal(&fault, &stack);
                }));
                Response::envelope(Status::ServerError, &Envelope::service_busy(Some(RECOVER_TAG)))
            }
        }
    }
}

fn take_stack(limit: usize) -> String {
    let trace = LAST_PANIC
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut s| s.take()))
        .ok()
        .flatten()
        .unwrap_or_default();
    bound(trace, limit)
}

/// Frames of the panic runtime, between the hook and the panic site.
const PANIC_RUNTIME: [&str; 4] = [
    "core::panicking::",
    "std::panicking::",
    "rust_begin_unwind",
    "__rust_end_short_backtrace",
];

/// The part of a rendered backtrace starting at the first frame after the
/// panic runtime. Traces without symbols are returned whole.
fn from_panic_site(trace: &str) -> &str {
    let mut in_runtime = false;
    let mut pos = 0;
    for line in trace.split_inclusive('\n') {
        if is_frame_header(line) {
            if PANIC_RUNTIME.iter().any(|m| line.contains(m)) {
                in_runtime = true;
            } else if in_runtime {
                return &trace[pos..];
            }
        }
        pos += line.len();
    }
    trace
}

/// `  12: some::function` as opposed to `at src/file.rs:1:2`.
fn is_frame_header(line: &str) -> bool {
    line.trim_start()
        .split_once(':')
        .is_some_and(|(n, _)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn bound(mut text: String, limit: usize) -> String {
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
