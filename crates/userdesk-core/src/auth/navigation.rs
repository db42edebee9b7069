use tokio::sync::mpsc;
use tracing::{info, warn};

/// Request to send the user back to the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    /// Where to return after logging in again.
    pub return_to: Option<String>,
}

/// Fire-and-forget "redirect to login" signal raised when a session ends.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, return_to: Option<&str>);
}

/// Only logs the redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self, return_to: Option<&str>) {
        info!(return_to = ?return_to, "Session ended, login required");
    }
}

/// Forwards redirects to whoever owns the receiving end.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<LoginRedirect>,
}

impl ChannelNavigator {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LoginRedirect>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn redirect_to_login(&self, return_to: Option<&str>) {
        let redirect = LoginRedirect {
            return_to: return_to.map(str::to_string),
        };
        if let Err(e) = self.tx.send(redirect) {
            warn!(error = %e, "Failed to send login redirect - receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_navigator_forwards_return_path() {
        let (navigator, mut rx) = ChannelNavigator::channel();
        navigator.redirect_to_login(Some("/admin/get-all-users"));

        let redirect = rx.try_recv().expect("redirect sent");
        assert_eq!(redirect.return_to.as_deref(), Some("/admin/get-all-users"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_navigator_survives_closed_receiver() {
        let (navigator, rx) = ChannelNavigator::channel();
        drop(rx);
        navigator.redirect_to_login(None);
    }
}
