//! Container renaming.
//!
//! Renaming through the provider's generic utility is slow, so registry- and
//! disk-image-backed containers are renamed in place first. The strategies run
//! as an ordered chain; a direct strategy that fails hands over to the next one
//! and the generic call closes the chain. Only the generic call's error ever
//! reaches the caller.

use std::sync::RwLock;

use tracing::debug;

use crate::error::Result;
use crate::naming::encode_legacy;
use crate::store::{CertificateStore, Container, Medium};

/// The user on whose behalf containers are renamed.
///
/// The security identifier is resolved lazily, at most once, and shared by
/// every rename that goes through this context. Concurrent first uses may
/// resolve it more than once; the results are identical.
#[derive(Debug, Default)]
pub struct UserContext {
    username: Option<String>,
    sid: RwLock<Option<String>>,
}

impl UserContext {
    /// Creates a context for `username`.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            sid: RwLock::new(None),
        }
    }

    /// Creates a context whose identifier the OS already provided.
    pub fn with_sid(username: impl Into<String>, sid: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            sid: RwLock::new(Some(sid.into())),
        }
    }

    /// Builds the context for the current process user.
    ///
    /// On unix the numeric user id is the identifier and the account name
    /// comes from the user database. Other platforms fall back to
    /// [`UserContext::from_env`].
    #[cfg(unix)]
    pub fn current() -> Self {
        let uid = nix::unistd::getuid();
        let username = match nix::unistd::User::from_uid(uid) {
            Ok(user) => user.map(|user| user.name),
            Err(e) => {
                debug!("Cant read account of uid {uid}: {e}");
                None
            }
        };
        Self {
            username,
            sid: RwLock::new(Some(uid.to_string())),
        }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::from_env()
    }

    /// Builds a context from `USERNAME` or `USER`; a `DOMAIN\` prefix is dropped.
    ///
    /// The identifier is left for the store to resolve on first use.
    pub fn from_env() -> Self {
        let username = std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .ok()
            .map(|name| strip_domain(&name).to_string())
            .filter(|name| !name.is_empty());
        Self {
            username,
            sid: RwLock::new(None),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the cached identifier, resolving it through the store on first use.
    pub fn sid<S: CertificateStore + ?Sized>(&self, store: &S) -> Option<String> {
        if let Some(sid) = self.sid.read().ok().and_then(|sid| sid.clone()) {
            return Some(sid);
        }
        let username = self.username.as_deref()?;
        debug!("User sid not in cache: {username}");
        let sid = match store.resolve_user_sid(username) {
            Ok(sid) if !sid.is_empty() => sid,
            Ok(_) => return None,
            Err(e) => {
                debug!("Cant resolve sid of {username}: {e}");
                return None;
            }
        };
        debug!("Set user sid to cache: {username} -> {sid}");
        if let Ok(mut cached) = self.sid.write() {
            *cached = Some(sid.clone());
        }
        Some(sid)
    }

    /// Drops the cached identifier so the next rename resolves it again.
    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.sid.write() {
            *cached = None;
        }
    }
}

fn strip_domain(name: &str) -> &str {
    name.rsplit_once('\\').map_or(name, |(_, user)| user)
}

/// Signal returned by a direct strategy.
enum Step {
    Renamed(Container),
    Next,
}

struct Request<'a, S: ?Sized> {
    store: &'a S,
    user: &'a UserContext,
    container: &'a Container,
    name: &'a str,
    legacy: &'a [u8],
}

/// Renames a container, preferring in-place renames for known media.
///
/// # Arguments
/// * `store` - The certificate store.
/// * `user` - Identity used by the in-place strategies.
/// * `container` - The container to rename; invalid after a successful rename.
/// * `name` - The target name in normal form.
///
/// # Returns
/// The renamed container. Fails with `NotExportable` when the provider refuses
/// to rename a non-exportable container.
pub fn rename_container<S: CertificateStore + ?Sized>(
    store: &S,
    user: &UserContext,
    container: &Container,
    name: &str,
) -> Result<Container> {
    let Some(legacy) = encode_legacy(name) else {
        debug!("Name [{name}] is not representable in windows-1251, use generic rename");
        return store.generic_rename(container, name);
    };
    let request = Request {
        store,
        user,
        container,
        name,
        legacy: &legacy,
    };

    let strategies: [fn(&Request<'_, S>) -> Step; 2] = [rename_registry_backed, rename_image_backed];
    for strategy in strategies {
        if let Step::Renamed(renamed) = strategy(&request) {
            return Ok(renamed);
        }
    }
    store.generic_rename(container, name)
}

fn rename_registry_backed<S: CertificateStore + ?Sized>(request: &Request<'_, S>) -> Step {
    if request.container.medium() != Medium::Registry {
        return Step::Next;
    }
    let Some(sid) = request.user.sid(request.store) else {
        debug!("Cant get user sid for direct rename, use generic rename");
        return Step::Next;
    };

    let current = request.container.short_name();
    match request
        .store
        .direct_rename_registry_backed(&sid, current, request.legacy)
    {
        Ok(true) => Step::Renamed(Container::new(
            format!(r"\\.\REGISTRY\{}", request.name),
            format!(r"\\.\REGISTRY\REGISTRY\\{}", request.name),
        )),
        Ok(false) => {
            debug!("Direct registry rename refused, use generic rename");
            Step::Next
        }
        Err(e) => {
            debug!("Error in direct registry rename, use generic rename: {e}");
            Step::Next
        }
    }
}

fn rename_image_backed<S: CertificateStore + ?Sized>(request: &Request<'_, S>) -> Step {
    if request.container.medium() != Medium::DiskImage {
        return Step::Next;
    }
    let Some(username) = request.user.username() else {
        debug!("Cant get username for direct rename, use generic rename");
        return Step::Next;
    };

    match request.store.direct_rename_image_backed(
        username,
        &request.container.unique_name,
        request.legacy,
    ) {
        Ok(true) => {}
        Ok(false) => {
            debug!("Direct disk image rename refused, use generic rename");
            return Step::Next;
        }
        Err(e) => {
            debug!("Error in direct disk image rename, use generic rename: {e}");
            return Step::Next;
        }
    }

    match request.store.get_container(&format!(r"\\.\HDIMAGE\{}", request.name)) {
        Ok(renamed) => Step::Renamed(renamed),
        Err(e) => {
            debug!("Error after direct disk image rename, use generic rename: {e}");
            Step::Next
        }
    }
}
