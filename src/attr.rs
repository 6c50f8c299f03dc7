//! Typed reads and writes of single attributes.
//!
//! Each attribute holds one scalar, or for strings one whitespace-delimited token. A missing
//! attribute is reported as [`Error::NotFound`] and malformed content as [`Error::Parse`].

use std::path::Path;
use std::str::FromStr;

use crate::{abi, Error, Result};
use crate::sys::AttributeTree;

fn read_token<T: AttributeTree>(tree: &T, dir: &Path, name: &str) -> Result<(std::path::PathBuf, String)> {
    let path = abi::attr_path(dir, name);
    let text = tree.read(&path).map_err(|error| Error::from_io(&path, error))?;
    let token = match text.split_whitespace().next() {
        Some(token) => token.to_owned(),
        None => return Err(Error::parse(path, "empty attribute")),
    };
    log::trace!("read({:?}) = {:?}", path, token);
    Ok((path, token))
}

fn read_parsed<T: AttributeTree, V: FromStr>(tree: &T, dir: &Path, name: &str) -> Result<V>
        where V::Err: std::fmt::Display {
    let (path, token) = read_token(tree, dir, name)?;
    token.parse().map_err(|error| Error::parse(path, format!("{:?}: {}", token, error)))
}

pub fn read_int<T: AttributeTree>(tree: &T, dir: &Path, name: &str) -> Result<i64> {
    read_parsed(tree, dir, name)
}

/// Reads a floating point attribute. `nan` is treated as malformed content.
pub fn read_float<T: AttributeTree>(tree: &T, dir: &Path, name: &str) -> Result<f64> {
    let value: f64 = read_parsed(tree, dir, name)?;
    if value.is_nan() {
        return Err(Error::parse(abi::attr_path(dir, name), "not a number"))
    }
    Ok(value)
}

pub fn read_string<T: AttributeTree>(tree: &T, dir: &Path, name: &str) -> Result<String> {
    Ok(read_token(tree, dir, name)?.1)
}

pub fn list_children<T: AttributeTree>(tree: &T, dir: &Path) -> Result<Vec<String>> {
    let children = tree.list(dir).map_err(|error| Error::from_io(dir, error))?;
    log::trace!("list({:?}) = {} entries", dir, children.len());
    Ok(children)
}

pub fn write_string<T: AttributeTree>(tree: &T, dir: &Path, name: &str, value: &str) -> Result<()> {
    let path = abi::attr_path(dir, name);
    log::trace!("write({:?}, {:?})", path, value);
    tree.write(&path, value).map_err(|error| Error::from_io(&path, error))
}

pub fn write_int<T: AttributeTree>(tree: &T, dir: &Path, name: &str, value: i64) -> Result<()> {
    write_string(tree, dir, name, &value.to_string())
}

/// Writes `value`, then reads the attribute back and fails with [`Error::VerifyMismatch`]
/// unless the stored value is the one written.
pub fn write_verify_string<T: AttributeTree>(tree: &T, dir: &Path, name: &str, value: &str) -> Result<()> {
    write_string(tree, dir, name, value)?;
    let stored = read_string(tree, dir, name)?;
    if stored != value {
        return Err(Error::VerifyMismatch {
            path: abi::attr_path(dir, name),
            expected: value.to_owned(),
            actual: stored,
        })
    }
    Ok(())
}

pub fn write_verify_int<T: AttributeTree>(tree: &T, dir: &Path, name: &str, value: i64) -> Result<()> {
    write_int(tree, dir, name, value)?;
    let stored = read_int(tree, dir, name)?;
    if stored != value {
        return Err(Error::VerifyMismatch {
            path: abi::attr_path(dir, name),
            expected: value.to_string(),
            actual: stored.to_string(),
        })
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::MemoryTree;

    fn tree() -> MemoryTree {
        let tree = MemoryTree::new("/bus", "/dev/iio");
        tree.insert_attr("/bus/device0/length", "64\n");
        tree.insert_attr("/bus/device0/accel_scale", "0.5\n");
        tree.insert_attr("/bus/device0/name", "imu0 trailing\n");
        tree.insert_attr("/bus/device0/garbage", "twelve\n");
        tree.insert_attr("/bus/device0/blank", "\n");
        tree.insert_attr("/bus/device0/broken", "nan\n");
        tree
    }

    #[test]
    fn test_read_scalars() {
        let tree = tree();
        let dir = Path::new("/bus/device0");
        assert_eq!(read_int(&tree, dir, "length").unwrap(), 64);
        assert_eq!(read_float(&tree, dir, "accel_scale").unwrap(), 0.5);
        assert_eq!(read_string(&tree, dir, "name").unwrap(), "imu0");
    }

    #[test]
    fn test_read_absent_or_malformed() {
        let tree = tree();
        let dir = Path::new("/bus/device0");
        assert!(matches!(read_int(&tree, dir, "missing"), Err(Error::NotFound { .. })));
        assert!(matches!(read_int(&tree, dir, "garbage"), Err(Error::Parse { .. })));
        assert!(matches!(read_float(&tree, dir, "blank"), Err(Error::Parse { .. })));
        assert!(matches!(read_float(&tree, dir, "broken"), Err(Error::Parse { .. })));
        assert!(matches!(list_children(&tree, Path::new("/nowhere")), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_write_verify() {
        let tree = tree();
        let dir = Path::new("/bus/device0");
        write_verify_int(&tree, dir, "length", 128).unwrap();
        assert_eq!(tree.attr("/bus/device0/length").as_deref(), Some("128"));

        tree.freeze("/bus/device0/length");
        match write_verify_int(&tree, dir, "length", 32) {
            Err(Error::VerifyMismatch { expected, actual, .. }) => {
                assert_eq!(expected, "32");
                assert_eq!(actual, "128");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(write_int(&tree, dir, "missing", 1), Err(Error::NotFound { .. })));
    }
}
