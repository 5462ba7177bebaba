//! Navigation collaborator used on unrecoverable auth failures

use tracing::warn;

/// Sends the user to a logical location such as `/login`.
///
/// The session core only knows path strings; what "going there" means is up to
/// the embedding application.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate(&self, path: &str) {
        self(path);
    }
}

/// Navigator for terminal front ends: there is nowhere to go, so tell the user
#[derive(Debug, Clone, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, path: &str) {
        warn!(target: "portal::navigation", path, "Navigation requested");
        match path {
            "/login" => eprintln!("Your session has ended. Run `portal login` to sign in again."),
            other => eprintln!("Redirected to {other}"),
        }
    }
}

#[cfg(any(test, feature = "tests"))]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub Navigator {}

        impl Navigator for Navigator {
            fn navigate(&self, path: &str);
        }
    }
}
