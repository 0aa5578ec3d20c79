//! # Protocol Registry
//!
//! A dispatch table mapping a URI scheme to the transport factory that
//! serves it. Native transports (RTMP, RTSP) are collaborators supplied by
//! the host; registering one makes the scheme resolvable. The set of
//! supported protocols is explicit and independently testable, instead of
//! being buried in scheme conditionals.

use std::collections::HashMap;
use std::sync::Arc;

use crate::source::DataSourceFactory;

/// Registry of native transport factories, keyed by lower-cased scheme.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    native: HashMap<String, Arc<dyn DataSourceFactory>>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport factory for a scheme, replacing any previous
    /// registration.
    pub fn register(&mut self, scheme: impl Into<String>, factory: Arc<dyn DataSourceFactory>) {
        self.native.insert(scheme.into().to_lowercase(), factory);
    }

    /// Look up the transport factory registered for a scheme.
    pub fn lookup(&self, scheme: &str) -> Option<&Arc<dyn DataSourceFactory>> {
        self.native.get(&scheme.to_lowercase())
    }

    /// The schemes with a registered transport.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.native.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("schemes", &self.native.keys().collect::<Vec<_>>())
            .finish()
    }
}
