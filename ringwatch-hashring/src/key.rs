use std::borrow::Borrow;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
/// The identity of a routable node on the ring.
///
/// Conventionally this is the `address:port` pair the node serves traffic on.
/// Keys are cheap to clone as the underlying string is reference counted.
pub struct RingKey(Arc<str>);

impl RingKey {
    /// Creates a new ring key from the given string.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Builds the conventional `host:port` ring key.
    pub fn from_host_port(host: impl Display, port: impl Display) -> Self {
        Self::new(format!("{host}:{port}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The smallest possible key, used as a lower search bound.
    pub(crate) fn min() -> Self {
        Self(Arc::from(""))
    }
}

impl Debug for RingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self.as_str(), f)
    }
}

impl Display for RingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for RingKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for RingKey {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for RingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for RingKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl From<&RingKey> for RingKey {
    fn from(key: &RingKey) -> Self {
        key.clone()
    }
}

impl PartialEq<str> for RingKey {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for RingKey {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(feature = "serde-support")]
impl serde::Serialize for RingKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde-support")]
impl<'de> serde::Deserialize<'de> for RingKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}
