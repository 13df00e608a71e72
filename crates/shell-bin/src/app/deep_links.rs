//! Routing of incoming deep links into the pending buffer.

use crate::app::ShellState;
use deep_link::{find_in_args, parse, ParsedDeepLink, Submission};
use shell_lifecycle::SecondInstance;
use tracing::{debug, info};

/// Classify `raw` and hand it to the buffer.
///
/// Rejected links are dropped; the parser logs the reason.
pub fn route_url(state: &ShellState, raw: &str) -> Option<Submission> {
    let ParsedDeepLink::Accepted(payload) = parse(raw) else {
        return None;
    };
    let kind = payload.kind();
    let submission = state.deep_links.store(payload);
    info!(kind = ?kind, submission = ?submission, "Routed deep link");
    Some(submission)
}

/// Handle a launch forwarded by a secondary instance.
///
/// The window is focused whether or not the launch carried a link.
pub fn route_launch(state: &ShellState, launch: &SecondInstance) -> Option<Submission> {
    let submission = match find_in_args(&launch.args) {
        Some(url) => route_url(state, &url),
        None => {
            debug!(args = launch.args.len(), "Second launch without a deep link");
            None
        }
    };
    state.window.focus();
    submission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::state::test_support::test_state;
    use crate::app::WindowReceiver;
    use deep_link::PayloadKind;
    use shell_ipc::PushType;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn launch(args: &[&str]) -> SecondInstance {
        SecondInstance {
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
        }
    }

    #[test]
    fn cold_link_is_buffered() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let submission = route_url(&state, "appscheme://auth/callback?code=xyz");
        assert_eq!(submission, Some(Submission::Buffered { replaced: false }));
        assert_eq!(state.deep_links.pending_kinds(), vec![PayloadKind::OAuthCallback]);
    }

    #[test]
    fn rejected_link_is_dropped() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        assert_eq!(route_url(&state, "https://example.com/auth/callback"), None);
        assert_eq!(route_url(&state, "appscheme://unknown/path"), None);
        assert!(state.deep_links.pending_kinds().is_empty());
    }

    #[test]
    fn forwarded_launch_delivers_then_focuses() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        state
            .deep_links
            .register_receiver(WindowReceiver::new(tx.clone()))
            .unwrap();
        state.window.attach(tx);

        let submission = route_launch(
            &state,
            &launch(&["lumen", "--flag", "appscheme://auth/confirm?token_hash=t1&type=email"]),
        );
        assert_eq!(submission, Some(Submission::Delivered));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.push_type, PushType::Verification);
        assert_eq!(first.data["kind"], "confirm");
        assert_eq!(rx.try_recv().unwrap().push_type, PushType::WindowFocus);
    }

    #[test]
    fn launch_without_link_still_focuses() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.window.attach(tx);

        assert_eq!(route_launch(&state, &launch(&["lumen"])), None);
        assert_eq!(rx.try_recv().unwrap().push_type, PushType::WindowFocus);
    }
}
