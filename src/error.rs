//! Maps a [`session::Error`] to the POSIX errno a client shim exposes
//! (spec §7: "errors returned from a client request become the errno
//! the client shim exposes"). `session::error` only names the kind;
//! this is the one place that owns the concrete number, reusing `nix`'s
//! `Errno` (already the workspace's errno vocabulary, see
//! `crates/runtime/src/worker.rs`'s `Errno::EINTR` match) rather than
//! hand-rolling the raw integers.

#[cfg(target_os = "linux")]
pub fn to_errno(error: session::Error) -> i32 {
    use nix::errno::Errno;

    let errno = match error {
        session::Error::Invalid => Errno::EINVAL,
        session::Error::NotFound => Errno::ENOENT,
        session::Error::NotSocket => Errno::ENOTSOCK,
        session::Error::NotConn => Errno::ENOTCONN,
        session::Error::AlreadyExists => Errno::EEXIST,
        session::Error::OutOfMemory => Errno::ENOMEM,
        session::Error::OutOfRange => Errno::EFAULT,
        session::Error::Corrupted => Errno::EIO,
        session::Error::DoubleFree => Errno::EINVAL,
        session::Error::Again => Errno::EAGAIN,
        session::Error::NoProtoOpt => Errno::ENOPROTOOPT,
        session::Error::Timeout => Errno::ETIMEDOUT,
        session::Error::IndexOverflow => Errno::EOVERFLOW,
        session::Error::Internal => Errno::EIO,
    };
    errno as i32
}

/// Same table, spelled out as raw numbers for targets `nix::errno`
/// doesn't cover. Values match the Linux `errno.h` numbering the
/// `Errno` variants above resolve to.
#[cfg(not(target_os = "linux"))]
pub fn to_errno(error: session::Error) -> i32 {
    match error {
        session::Error::Invalid => 22,       // EINVAL
        session::Error::NotFound => 2,        // ENOENT
        session::Error::NotSocket => 88,      // ENOTSOCK
        session::Error::NotConn => 107,       // ENOTCONN
        session::Error::AlreadyExists => 17,  // EEXIST
        session::Error::OutOfMemory => 12,    // ENOMEM
        session::Error::OutOfRange => 14,     // EFAULT
        session::Error::Corrupted => 5,       // EIO
        session::Error::DoubleFree => 22,     // EINVAL
        session::Error::Again => 11,          // EAGAIN
        session::Error::NoProtoOpt => 92,     // ENOPROTOOPT
        session::Error::Timeout => 110,       // ETIMEDOUT
        session::Error::IndexOverflow => 75,  // EOVERFLOW
        session::Error::Internal => 5,        // EIO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_nonzero_errno() {
        let variants = [
            session::Error::Invalid,
            session::Error::NotFound,
            session::Error::NotSocket,
            session::Error::NotConn,
            session::Error::AlreadyExists,
            session::Error::OutOfMemory,
            session::Error::OutOfRange,
            session::Error::Corrupted,
            session::Error::DoubleFree,
            session::Error::Again,
            session::Error::NoProtoOpt,
            session::Error::Timeout,
            session::Error::IndexOverflow,
            session::Error::Internal,
        ];

        for variant in variants {
            assert_ne!(to_errno(variant), 0);
        }
    }

    #[test]
    fn not_found_maps_to_enoent() {
        assert_eq!(to_errno(session::Error::NotFound), 2);
    }
}
