//! Torrent metainfo file list parsing
//!
//! Extracts the file list (index, path, size) from a `.torrent` file without
//! touching the network. Paths of multi-file torrents are rooted at the
//! torrent name, the way torrent clients lay them out under the save path.

use super::ContainerFile;
use super::bencode::BencodeValue;
use crate::error::{Error, Result};
use std::path::Path;

/// Parsed metainfo of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    /// Torrent name (top-level directory for multi-file torrents)
    pub name: String,
    /// Files in container order
    pub files: Vec<ContainerFile>,
}

impl Metainfo {
    /// Parse raw `.torrent` contents
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let root = BencodeValue::decode(data).map_err(|e| Error::Metainfo(e.to_string()))?;
        let info = root
            .get("info")
            .ok_or_else(|| Error::Metainfo("missing info dictionary".into()))?;

        let name = info
            .get("name.utf-8")
            .or_else(|| info.get("name"))
            .and_then(BencodeValue::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| Error::Metainfo("missing torrent name".into()))?;
        check_component(&name)?;

        let files = match (info.get("files"), info.get("length")) {
            (Some(list), _) => {
                let entries = list
                    .as_list()
                    .ok_or_else(|| Error::Metainfo("files is not a list".into()))?;
                entries
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| multi_file_entry(&name, index, entry))
                    .collect::<Result<Vec<_>>>()?
            }
            (None, Some(length)) => vec![ContainerFile {
                index: 0,
                path: name.clone(),
                size: non_negative(length.as_integer())?,
            }],
            (None, None) => {
                return Err(Error::Metainfo(
                    "info has neither files nor length (v2-only torrents are not supported)"
                        .into(),
                ));
            }
        };

        Ok(Self { name, files })
    }

    /// Read and parse a `.torrent` file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Self::from_bytes(&data).map_err(|e| match e {
            Error::Metainfo(reason) => Error::Metainfo(format!("{}: {}", path.display(), reason)),
            other => other,
        })
    }

    /// Total size of all files in bytes
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

fn multi_file_entry(root: &str, index: usize, entry: &BencodeValue) -> Result<ContainerFile> {
    let size = non_negative(entry.get("length").and_then(BencodeValue::as_integer))?;
    let components = entry
        .get("path.utf-8")
        .or_else(|| entry.get("path"))
        .and_then(BencodeValue::as_list)
        .ok_or_else(|| Error::Metainfo(format!("file {index} has no path")))?;
    if components.is_empty() {
        return Err(Error::Metainfo(format!("file {index} has an empty path")));
    }

    let mut path = root.to_string();
    for component in components {
        let component = component
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| Error::Metainfo(format!("file {index} has a non-string path")))?;
        check_component(&component)?;
        path.push('/');
        path.push_str(&component);
    }

    Ok(ContainerFile { index, path, size })
}

fn non_negative(length: Option<i64>) -> Result<u64> {
    length
        .and_then(|l| u64::try_from(l).ok())
        .ok_or_else(|| Error::Metainfo("missing or negative file length".into()))
}

// Components are joined onto the save path, so they must stay inside it.
fn check_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\', '\0'])
    {
        return Err(Error::Metainfo(format!(
            "unsafe path component {component:?}"
        )));
    }
    Ok(())
}

/// Build `.torrent` bytes for a file list (used to create fixtures)
///
/// A single entry without a directory produces a single-file torrent; anything
/// else produces a multi-file torrent named `name`.
pub fn build_metainfo(name: &str, files: &[(&str, u64)]) -> Vec<u8> {
    let info = if let [(path, size)] = files
        && !path.contains('/')
        && *path == name
    {
        BencodeValue::dict()
            .insert("name", BencodeValue::string(name))
            .insert("length", BencodeValue::integer(*size as i64))
    } else {
        let mut list = BencodeValue::list();
        for (path, size) in files {
            let mut components = BencodeValue::list();
            for part in path.split('/') {
                components = components.push(BencodeValue::string(part));
            }
            list = list.push(
                BencodeValue::dict()
                    .insert("length", BencodeValue::integer(*size as i64))
                    .insert("path", components),
            );
        }
        BencodeValue::dict()
            .insert("name", BencodeValue::string(name))
            .insert("files", list)
    };
    BencodeValue::dict()
        .insert("announce", BencodeValue::string("http://tracker.invalid/announce"))
        .insert("info", info.insert("piece length", BencodeValue::integer(16_384)))
        .encode()
}
