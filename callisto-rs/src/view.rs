//! Provides an immutable view on the bytes of a cached value.
//!
//! All values managed by a [Group](crate::group::Group) are handed out as [ByteView](ByteView)
//! instances. A view is a cheap handle (internally a reference counted [bytes::Bytes]) which can
//! be cloned and shared freely across tasks, as the underlying buffer is never mutated once the
//! view has been constructed. This is what permits the cache, the coalescer and any number of
//! concurrent callers to all observe the very same value without copying it around.
use crate::lru::ByteSize;
use bytes::Bytes;

/// An immutable handle onto the bytes of a cached value.
///
/// Cloning a view is cheap (it only bumps a reference counter). Two views compare equal if their
/// bytes compare equal.
///
/// # Examples
///
/// ```
/// # use callisto::view::ByteView;
/// let view = ByteView::from("630");
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.as_slice(), b"630");
///
/// // Clones share the same underlying buffer...
/// let other = view.clone();
/// assert_eq!(view, other);
///
/// // ...whereas to_vec hands out a fresh copy which the caller may mutate at will.
/// let mut copy = view.to_vec();
/// copy.push(b'!');
/// assert_eq!(view.len(), 3);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Returns the number of bytes represented by this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if this view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Provides direct access to the underlying bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns a fresh owned copy of the underlying bytes.
    ///
    /// This is intended for handing data out to external parties which must not be able to
    /// alias the buffer shared by all clones of this view.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Renders the underlying bytes as a string, replacing invalid UTF-8 sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data.as_bytes()),
        }
    }
}

impl From<String> for ByteView {
    fn from(data: String) -> Self {
        ByteView {
            data: Bytes::from(data.into_bytes()),
        }
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteView({} bytes)", self.data.len())
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ByteView;

    #[test]
    fn equality_is_byte_equality() {
        let left = ByteView::from("hello");
        let right = ByteView::from(b"hello".as_slice());
        assert_eq!(left, right);
        assert_ne!(left, ByteView::from("world"));
    }

    #[test]
    fn to_vec_yields_an_independent_copy() {
        let view = ByteView::from("abc");
        let mut copy = view.to_vec();
        copy[0] = b'x';
        assert_eq!(view.as_slice(), b"abc");
    }
}
