//! Validation of the names that travel inside D-Bus messages.
//!
//! The marshaling engine itself only needs [`validate_object_path`], but the
//! same grammar checks are used by anything that builds message headers, so
//! they live together here.

use crate::error::{Error, Result};

/// Longest permitted bus, interface, member or error name.
pub const MAX_NAME_LENGTH: usize = 255;

fn invalid_name(kind: &'static str, name: &str, reason: &'static str) -> Error {
    Error::InvalidName {
        kind,
        name: name.to_owned(),
        reason,
    }
}

fn invalid_path(path: &str, reason: &'static str) -> Error {
    Error::InvalidObjectPath {
        path: path.to_owned(),
        reason,
    }
}

pub fn validate_object_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid_path(path, "must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid_path(path, "must begin with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid_path(path, "must not end with '/'"));
    }
    for element in path[1..].split('/') {
        if element.is_empty() {
            return Err(invalid_path(path, "must not contain '//'"));
        }
        if !element
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            return Err(invalid_path(path, "elements may only contain [A-Za-z0-9_]"));
        }
    }
    Ok(())
}

fn check_dotted(
    kind: &'static str,
    name: &str,
    allow_hyphen: bool,
    allow_leading_digit: bool,
) -> Result<()> {
    let mut elements = 0;
    for element in name.split('.') {
        elements += 1;
        let first = match element.bytes().next() {
            Some(first) => first,
            None => return Err(invalid_name(kind, name, "contains an empty element")),
        };
        if first.is_ascii_digit() && !allow_leading_digit {
            return Err(invalid_name(kind, name, "element begins with a digit"));
        }
        let valid = element
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || (allow_hyphen && b == b'-'));
        if !valid {
            return Err(invalid_name(kind, name, "contains an invalid character"));
        }
    }
    if elements < 2 {
        return Err(invalid_name(kind, name, "must contain at least two elements"));
    }
    Ok(())
}

fn check_length(kind: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid_name(kind, name, "must not be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid_name(kind, name, "longer than 255 bytes"));
    }
    Ok(())
}

/// Validates a unique (`:1.42`) or well-known (`org.example.Foo`) bus name.
pub fn validate_bus_name(name: &str) -> Result<()> {
    check_length("bus name", name)?;
    match name.strip_prefix(':') {
        Some(unique) => check_dotted("bus name", unique, true, true),
        None => check_dotted("bus name", name, true, false),
    }
}

pub fn validate_interface_name(name: &str) -> Result<()> {
    check_length("interface name", name)?;
    check_dotted("interface name", name, false, false)
}

pub fn validate_error_name(name: &str) -> Result<()> {
    check_length("error name", name)?;
    check_dotted("error name", name, false, false)
}

pub fn validate_member_name(name: &str) -> Result<()> {
    check_length("member name", name)?;
    if name.as_bytes()[0].is_ascii_digit() {
        return Err(invalid_name("member name", name, "begins with a digit"));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(invalid_name("member name", name, "contains an invalid character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use test_log::test;

    #[test]
    fn object_paths() {
        assert!(validate_object_path("/foo/bar").is_ok());
        assert!(validate_object_path("/").is_ok());
        assert!(validate_object_path("/org/freedesktop/DBus").is_ok());
        assert!(validate_object_path("/a_1/B2").is_ok());

        for bad in &["/foo//bar", "/foo/", "", "foo", "//", "/foo-bar", "/foo.bar"] {
            let e = validate_object_path(bad).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::Validation, "{:?}", bad);
        }
    }

    #[test]
    fn bus_names() {
        assert!(validate_bus_name("org.freedesktop.DBus").is_ok());
        assert!(validate_bus_name(":1.42").is_ok());
        assert!(validate_bus_name("com.example.my-service").is_ok());

        assert!(validate_bus_name("org").is_err());
        assert!(validate_bus_name("org..foo").is_err());
        assert!(validate_bus_name("org.1foo").is_err());
        assert!(validate_bus_name(":").is_err());
        assert!(validate_bus_name("").is_err());
        assert!(validate_bus_name(&format!("a.{}", "b".repeat(300))).is_err());
    }

    #[test]
    fn interface_and_error_names() {
        assert!(validate_interface_name("org.freedesktop.DBus.Properties").is_ok());
        assert!(validate_interface_name("org.free-desktop").is_err());
        assert!(validate_interface_name("Properties").is_err());
        assert!(validate_error_name("org.freedesktop.DBus.Error.Failed").is_ok());
        assert!(validate_error_name("org.freedesktop.").is_err());
    }

    #[test]
    fn member_names() {
        assert!(validate_member_name("GetAll").is_ok());
        assert!(validate_member_name("_private9").is_ok());
        assert!(validate_member_name("9lives").is_err());
        assert!(validate_member_name("Get.All").is_err());
        assert!(validate_member_name("").is_err());
    }
}
