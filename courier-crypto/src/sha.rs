//! Hash macros over one or more concatenated byte slices.

#[doc(hidden)]
#[macro_export]
macro_rules! digest {
    ( $hasher:ty, $( $x:expr ),+ ) => {{
        use ::sha2::digest::Digest;
        let mut hasher = <$hasher>::new();
        $( hasher.update($x); )+
        hasher.finalize().into()
    }};
}

/// SHA-1 of the concatenation of the given byte slices, as `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ ) => {{
        let out: [u8; 20] = $crate::digest!(::sha1::Sha1, $( $x ),+);
        out
    }};
}

/// SHA-256 of the concatenation of the given byte slices, as `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ ) => {{
        let out: [u8; 32] = $crate::digest!(::sha2::Sha256, $( $x ),+);
        out
    }};
}
