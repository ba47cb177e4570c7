//! Call stack capture at the query site.

use crate::record::StackFrame;
use backtrace::Backtrace;

/// Capture the current thread's call stack, outermost frame first
///
/// **Public** - called from the post-execution hook
///
/// Frames belonging to the capture machinery (the backtrace crate, this
/// function, and the hook frame right above it) are dropped. When symbols
/// are unavailable and this function can't find itself, every frame is kept.
#[inline(never)]
pub fn capture_stack() -> Vec<StackFrame> {
    let backtrace = Backtrace::new();

    // Innermost first, one entry per symbol so inlined frames show up too
    let frames: Vec<StackFrame> = backtrace
        .frames()
        .iter()
        .flat_map(|frame| {
            frame.symbols().iter().map(|symbol| {
                StackFrame::new(
                    symbol
                        .name()
                        .map(|name| format!("{:#}", name))
                        .unwrap_or_else(|| "<unknown>".to_string()),
                    symbol
                        .filename()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default(),
                    symbol.lineno(),
                )
            })
        })
        .collect();

    let mut stack = trim_capture_frames(frames);
    stack.reverse();
    stack
}

/// Drop frames up to and including `capture_stack` and the hook calling it
///
/// **Private** - input is innermost first
///
/// The hook may reach `capture_stack` through panic-guard frames, so
/// everything up to the first `after_execute` frame goes too.
fn trim_capture_frames(frames: Vec<StackFrame>) -> Vec<StackFrame> {
    let Some(own) = frames.iter().position(|f| f.name.contains("capture_stack")) else {
        return frames;
    };

    let rest = &frames[own + 1..];
    let cut = rest
        .iter()
        .position(|f| f.name.contains("after_execute"))
        .map_or(0, |hook| hook + 1);

    frames.into_iter().skip(own + 1 + cut).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str) -> StackFrame {
        StackFrame::new(name, "src/lib.rs", Some(1))
    }

    #[test]
    fn test_trim_drops_capture_and_hook() {
        let frames = vec![
            frame("backtrace::capture::Backtrace::new"),
            frame("querytap::capture::stack::capture_stack"),
            frame("<SessionListener as ExecutionListener>::after_execute"),
            frame("querytap::capture::events::Engine::dispatch_after"),
            frame("app::main"),
        ];

        let trimmed = trim_capture_frames(frames);
        let names: Vec<&str> = trimmed.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["querytap::capture::events::Engine::dispatch_after", "app::main"]);
    }

    #[test]
    fn test_trim_skips_panic_guard_frames() {
        let frames = vec![
            frame("querytap::capture::stack::capture_stack"),
            frame("std::panicking::try::do_call"),
            frame("std::panic::catch_unwind"),
            frame("<SessionListener as ExecutionListener>::after_execute"),
            frame("app::main"),
        ];

        let trimmed = trim_capture_frames(frames);
        let names: Vec<&str> = trimmed.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["app::main"]);
    }

    #[test]
    fn test_trim_without_hook_keeps_callers() {
        let frames = vec![frame("querytap::capture::stack::capture_stack"), frame("app::main")];
        assert_eq!(trim_capture_frames(frames), vec![frame("app::main")]);
    }

    #[test]
    fn test_trim_keeps_everything_without_symbols() {
        let frames = vec![frame("<unknown>"), frame("<unknown>")];
        assert_eq!(trim_capture_frames(frames).len(), 2);
    }

    #[test]
    fn test_live_stack_omits_capture_frame() {
        let stack = capture_stack();
        assert!(stack.iter().all(|f| !f.name.ends_with("stack::capture_stack")));
    }
}
