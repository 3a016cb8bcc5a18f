//! Parsing of ACL and auth strings as written in configuration.
//!
//! ACL lists look like `world:anyone:rwcda,digest:user:hash:r` and auth
//! lists like `digest:user:password`.

use crate::error::{CoordError, CoordResult};
use fencekeeper_store::{Acl, AuthInfo, Id, Perms};

/// Parses a comma separated list of `scheme:id:perms` entries.
///
/// The id may itself contain colons; the scheme ends at the first colon and
/// the permissions start after the last one. Empty entries are skipped.
///
/// # Errors
///
/// Returns `InvalidAcl` for entries without both separators or with
/// unknown permission characters.
pub fn parse_acls(list: &str) -> CoordResult<Vec<Acl>> {
    let mut acls = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let first = entry
            .find(':')
            .ok_or_else(|| CoordError::invalid_acl(entry, "does not have the form scheme:id:perm"))?;
        let last = entry.rfind(':').unwrap_or(first);
        if first == last {
            return Err(CoordError::invalid_acl(
                entry,
                "does not have the form scheme:id:perm",
            ));
        }
        let perms = parse_perms(entry, &entry[last + 1..])?;
        acls.push(Acl::new(
            perms,
            Id::new(&entry[..first], &entry[first + 1..last]),
        ));
    }
    Ok(acls)
}

/// Parses a comma separated list of `scheme:auth` entries.
///
/// # Errors
///
/// Returns `InvalidAcl` for entries without a colon.
pub fn parse_auth(list: &str) -> CoordResult<Vec<AuthInfo>> {
    list.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| {
            let (scheme, auth) = entry
                .split_once(':')
                .ok_or_else(|| CoordError::invalid_acl(entry, "auth must be scheme:auth"))?;
            Ok(AuthInfo::new(scheme, auth.as_bytes()))
        })
        .collect()
}

fn parse_perms(entry: &str, perms: &str) -> CoordResult<Perms> {
    let mut out = Perms::default();
    for c in perms.chars() {
        out = out
            | match c {
                'r' => Perms::READ,
                'w' => Perms::WRITE,
                'c' => Perms::CREATE,
                'd' => Perms::DELETE,
                'a' => Perms::ADMIN,
                other => {
                    return Err(CoordError::invalid_acl(
                        entry,
                        format!("invalid permission character {other:?}"),
                    ))
                }
            };
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_acl() {
        let acls = parse_acls("world:anyone:rwcda").unwrap();
        assert_eq!(acls, Acl::open_unsafe());
    }

    #[test]
    fn parse_multiple_acls() {
        let acls = parse_acls("sasl:hdfs/host@REALM:cdrwa, digest:user:pass-hash:r ,").unwrap();
        assert_eq!(acls.len(), 2);
        assert_eq!(acls[0].id, Id::new("sasl", "hdfs/host@REALM"));
        assert_eq!(acls[0].perms, Perms::ALL);
        assert_eq!(acls[1].id, Id::new("digest", "user:pass-hash"));
        assert_eq!(acls[1].perms, Perms::READ);
    }

    #[test]
    fn parse_empty_acl_list() {
        assert!(parse_acls("").unwrap().is_empty());
    }

    #[test]
    fn reject_malformed_acls() {
        assert!(matches!(
            parse_acls("world:anyone"),
            Err(CoordError::InvalidAcl { .. })
        ));
        assert!(matches!(
            parse_acls("world:anyone:rwx"),
            Err(CoordError::InvalidAcl { .. })
        ));
    }

    #[test]
    fn parse_auth_entries() {
        let auth = parse_auth("digest:user:password").unwrap();
        assert_eq!(auth, vec![AuthInfo::new("digest", "user:password")]);
        assert!(parse_auth("nocolon").is_err());
    }
}
