//! Key material shared by every physical connection to one datacenter.

use std::sync::RwLock;

use courier_crypto::AuthKey;

/// Temporary (session-scoped) key material plus its protocol flags.
#[derive(Clone, Debug)]
pub struct TempKey {
    /// The negotiated 256-byte key.
    pub auth_key: AuthKey,
    /// Current server salt for outgoing envelopes.
    pub salt: i64,
    /// Whether the handshake envelope (`initConnection`) has been sent once.
    pub inited: bool,
    /// Whether the key has been bound to the permanent key (forward secrecy).
    pub bound: bool,
}

/// A consistent read of the temp key taken at the start of a batch attempt.
#[derive(Clone, Debug)]
pub struct TempKeySnapshot {
    /// The key to encrypt with.
    pub auth_key: AuthKey,
    /// Salt to embed in the envelope.
    pub salt: i64,
    /// Whether the handshake envelope has already gone out.
    pub inited: bool,
    /// Whether the key is bound (forward secrecy).
    pub bound: bool,
}

#[derive(Debug, Default)]
struct Inner {
    temp: Option<TempKey>,
    perm: Option<AuthKey>,
    pfs: bool,
    http: bool,
}

/// Key state shared between the write pipeline and the (external) read path.
///
/// All mutation happens in short lock sections; installing a temporary key
/// swaps the whole `Option<TempKey>`, so a reader observes either no key or a
/// fully usable one, never a partial install.
#[derive(Debug, Default)]
pub struct SharedKeys {
    inner: RwLock<Inner>,
}

impl SharedKeys {
    /// New key state with neither key present.
    ///
    /// `pfs` requires binding before method calls may be sent; `http` puts
    /// the connection in polling transport mode.
    pub fn new(pfs: bool, http: bool) -> Self {
        Self {
            inner: RwLock::new(Inner { temp: None, perm: None, pfs, http }),
        }
    }

    /// Install a fresh temporary key, replacing any previous one.
    ///
    /// The new key starts not-inited and unbound.
    pub fn install_temp_key(&self, auth_key: AuthKey, salt: i64) {
        let mut inner = self.inner.write().unwrap();
        inner.temp = Some(TempKey { auth_key, salt, inited: false, bound: false });
    }

    /// Install the permanent key.
    pub fn install_perm_key(&self, auth_key: AuthKey) {
        self.inner.write().unwrap().perm = Some(auth_key);
    }

    /// Whether a temporary key is currently usable.
    pub fn has_temp_key(&self) -> bool {
        self.inner.read().unwrap().temp.is_some()
    }

    /// Whether the permanent key is present.
    pub fn has_perm_key(&self) -> bool {
        self.inner.read().unwrap().perm.is_some()
    }

    /// Consistent snapshot of the temp key for one batch attempt.
    pub fn temp_key(&self) -> Option<TempKeySnapshot> {
        self.inner.read().unwrap().temp.as_ref().map(|t| TempKeySnapshot {
            auth_key: t.auth_key.clone(),
            salt: t.salt,
            inited: t.inited,
            bound: t.bound,
        })
    }

    /// Record that the handshake envelope has been sent.
    pub fn mark_inited(&self) {
        if let Some(t) = self.inner.write().unwrap().temp.as_mut() {
            t.inited = true;
        }
    }

    /// Record that the temp key is bound to the permanent key.
    pub fn mark_bound(&self) {
        if let Some(t) = self.inner.write().unwrap().temp.as_mut() {
            t.bound = true;
        }
    }

    /// Whether the temp key is bound.
    pub fn is_bound(&self) -> bool {
        self.inner.read().unwrap().temp.as_ref().is_some_and(|t| t.bound)
    }

    /// Whether the handshake envelope has been sent on this temp key.
    pub fn is_inited(&self) -> bool {
        self.inner.read().unwrap().temp.as_ref().is_some_and(|t| t.inited)
    }

    /// Whether forward-secrecy binding is required before method calls.
    pub fn pfs(&self) -> bool {
        self.inner.read().unwrap().pfs
    }

    /// Whether the connection operates in polling (HTTP) transport mode.
    pub fn is_http(&self) -> bool {
        self.inner.read().unwrap().http
    }

    /// Switch the transport mode flag.
    pub fn set_http(&self, http: bool) {
        self.inner.write().unwrap().http = http;
    }

    /// Rotate the server salt (driven by the external read path).
    pub fn set_salt(&self, salt: i64) {
        if let Some(t) = self.inner.write().unwrap().temp.as_mut() {
            t.salt = salt;
        }
    }
}
