use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

const SCHEME: &str = "bytes://anexo/";

/// Handle to bytes that egui can display by uri without a network round trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalRef {
    uri: String,
}

impl LocalRef {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_local(uri: &str) -> bool {
        uri.starts_with(SCHEME)
    }
}

/// Registry of live local references.
///
/// Revoked uris are queued until the gui drains them and tells egui to drop
/// the decoded texture.
#[derive(Default)]
pub struct LocalRefs {
    live: HashMap<String, Arc<[u8]>>,
    revoked: Vec<String>,
}

impl LocalRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, bytes: impl Into<Arc<[u8]>>) -> LocalRef {
        let uri = format!("{SCHEME}{}", Uuid::new_v4());
        self.live.insert(uri.clone(), bytes.into());
        log::debug!("created local ref {uri}");
        LocalRef { uri }
    }

    pub fn revoke(&mut self, local: &LocalRef) {
        self.revoke_uri(local.uri());
    }

    /// No-op for uris that are not live local references.
    pub fn revoke_uri(&mut self, uri: &str) {
        if self.live.remove(uri).is_some() {
            log::debug!("revoked local ref {uri}");
            self.revoked.push(uri.to_owned());
        }
    }

    pub fn revoke_all(&mut self) {
        let uris: Vec<String> = self.live.keys().cloned().collect();
        for uri in uris {
            self.revoke_uri(&uri);
        }
    }

    pub fn bytes(&self, uri: &str) -> Option<Arc<[u8]>> {
        self.live.get(uri).cloned()
    }

    pub fn is_live(&self, uri: &str) -> bool {
        self.live.contains_key(uri)
    }

    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub fn drain_revoked(&mut self) -> Vec<String> {
        std::mem::take(&mut self.revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_gives_unique_uris() {
        let mut refs = LocalRefs::new();
        let a = refs.create(vec![1u8, 2, 3]);
        let b = refs.create(vec![1u8, 2, 3]);
        assert_ne!(a, b);
        assert!(LocalRef::is_local(a.uri()));
        assert_eq!(refs.live(), 2);
        assert_eq!(refs.bytes(a.uri()).as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn revoke_queues_uri_once() {
        let mut refs = LocalRefs::new();
        let a = refs.create(vec![0u8]);
        refs.revoke(&a);
        refs.revoke(&a);
        assert_eq!(refs.live(), 0);
        assert!(refs.bytes(a.uri()).is_none());
        assert_eq!(refs.drain_revoked(), vec![a.uri().to_owned()]);
        assert!(refs.drain_revoked().is_empty());
    }

    #[test]
    fn revoke_ignores_remote_uris() {
        let mut refs = LocalRefs::new();
        refs.revoke_uri("https://x/y.png");
        assert!(refs.drain_revoked().is_empty());
    }

    #[test]
    fn revoke_all_empties_registry() {
        let mut refs = LocalRefs::new();
        refs.create(vec![0u8]);
        refs.create(vec![1u8]);
        refs.revoke_all();
        assert_eq!(refs.live(), 0);
        assert_eq!(refs.drain_revoked().len(), 2);
    }
}
