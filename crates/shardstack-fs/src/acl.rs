//! Canned bucket ACLs.

use std::fmt;
use std::str::FromStr;

use shardstack_storage::StorageError;

/// The canned ACLs a bucket can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketAcl {
    /// Owner-only access.
    #[default]
    Private,
    /// Anonymous reads allowed.
    PublicRead,
    /// Anonymous reads and writes allowed.
    PublicReadWrite,
    /// Reads allowed for any authenticated caller.
    AuthenticatedRead,
}

impl BucketAcl {
    /// The canonical wire name of this ACL.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::PublicRead => "public-read",
            Self::PublicReadWrite => "public-read-write",
            Self::AuthenticatedRead => "authenticated-read",
        }
    }
}

impl fmt::Display for BucketAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketAcl {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public-read" => Ok(Self::PublicRead),
            "public-read-write" => Ok(Self::PublicReadWrite),
            "authenticated-read" => Ok(Self::AuthenticatedRead),
            other => Err(StorageError::InvalidArgument {
                message: format!("unsupported canned ACL: {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_round_trip_acl_names() {
        for acl in [
            BucketAcl::Private,
            BucketAcl::PublicRead,
            BucketAcl::PublicReadWrite,
            BucketAcl::AuthenticatedRead,
        ] {
            let parsed: BucketAcl = acl.as_str().parse().expect("parse");
            assert_eq!(parsed, acl);
        }
    }

    #[test]
    fn test_should_reject_unknown_acl() {
        assert!("log-delivery-write".parse::<BucketAcl>().is_err());
    }

    #[test]
    fn test_should_default_to_private() {
        assert_eq!(BucketAcl::default(), BucketAcl::Private);
    }
}
