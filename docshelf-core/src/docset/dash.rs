//! Dash bundle layout
//!
//! ```text
//! Bash.docset/
//!   Contents/Info.plist
//!   Contents/Resources/docSet.dsidx     SQLite symbol index
//!   Contents/Resources/Documents/...
//! ```
//!
//! The index is either a flat `searchIndex(name, type, path)` table or the
//! Core Data schema older generators emit (`ZTOKEN` and friends).

use super::index::DocsetIndex;
use super::symbol::RawSymbol;
use crate::error::{DocsetError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONTENTS_DIR: &str = "Contents";
pub const RESOURCES_DIR: &str = "Resources";
pub const INDEX_FILE: &str = "docSet.dsidx";

const PLIST_FILES: [&str; 2] = ["Info.plist", "info.plist"];

const FLAT_QUERY: &str = "SELECT name, type, path, NULL FROM searchIndex";

const CORE_DATA_QUERY: &str = "SELECT ztokenname, ztypename, zpath, zanchor FROM ztoken \
     INNER JOIN ztokenmetainformation ON ztoken.zmetainformation = ztokenmetainformation.z_pk \
     INNER JOIN zfilepath ON ztokenmetainformation.zfile = zfilepath.z_pk \
     INNER JOIN ztokentype ON ztoken.ztokentype = ztokentype.z_pk";

pub fn resources_dir(root: &Path) -> PathBuf {
    root.join(CONTENTS_DIR).join(RESOURCES_DIR)
}

pub fn index_path(root: &Path) -> PathBuf {
    resources_dir(root).join(INDEX_FILE)
}

/// The `Info.plist` properties a docset uses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoPlist {
    /// `CFBundleName`
    pub bundle_name: Option<String>,
    /// Platform family, plugin keyword, keyword and family, in that order
    pub keywords: Vec<String>,
    pub index_file_path: Option<String>,
    pub is_java_script_enabled: Option<bool>,
}

impl InfoPlist {
    /// Read `Contents/Info.plist`; a bundle without one yields defaults
    pub fn read(target: &str, root: &Path) -> Result<Self> {
        let contents = root.join(CONTENTS_DIR);
        let Some(path) = PLIST_FILES
            .iter()
            .map(|name| contents.join(name))
            .find(|p| p.is_file())
        else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| DocsetError::corrupt(target, format!("cannot read Info.plist: {e}")))?;
        Self::parse(target, &text)
    }

    /// Parse the top-level dictionary of an XML property list
    pub fn parse(target: &str, text: &str) -> Result<Self> {
        let invalid = |e: quick_xml::Error| DocsetError::corrupt(target, format!("invalid Info.plist: {e}"));

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        // plist > dict > key|string|true|false
        let mut path: Vec<String> = Vec::new();
        let mut key: Option<String> = None;
        let mut strings: HashMap<String, String> = HashMap::new();
        let mut flags: HashMap<String, bool> = HashMap::new();
        loop {
            match reader.read_event().map_err(invalid)? {
                Event::Start(e) => {
                    path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Empty(e) if path.len() == 2 => {
                    let value = match e.local_name().as_ref() {
                        b"true" => Some(true),
                        b"false" => Some(false),
                        _ => None,
                    };
                    if let (Some(key), Some(value)) = (key.take(), value) {
                        flags.insert(key, value);
                    }
                }
                Event::Text(t) if path.len() == 3 => {
                    let text = t.unescape().map_err(invalid)?.trim().to_string();
                    match path[2].as_str() {
                        "key" => key = Some(text),
                        "string" => {
                            if let Some(key) = key.take() {
                                strings.insert(key, text);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let mut keywords: Vec<String> = Vec::new();
        let mut add = |keyword: Option<&String>| {
            if let Some(keyword) = keyword.filter(|k| !k.is_empty()) {
                if !keywords.contains(keyword) {
                    keywords.push(keyword.clone());
                }
            }
        };
        add(strings.get("DocSetPlatformFamily"));
        add(strings.get("DashDocSetPluginKeyword"));
        add(strings.get("DashDocSetKeyword"));
        // Generated table-of-contents families are not meaningful keywords
        add(strings
            .get("DashDocSetFamily")
            .filter(|family| !family.contains("dashtoc")));

        Ok(Self {
            bundle_name: strings.remove("CFBundleName").filter(|n| !n.is_empty()),
            keywords,
            index_file_path: strings.remove("dashIndexFilePath"),
            is_java_script_enabled: flags.get("isJavaScriptEnabled").copied(),
        })
    }
}

/// Load the SQLite symbol index of the Dash bundle at `root`
pub fn read_index(target: &str, root: &Path) -> Result<DocsetIndex> {
    let path = index_path(root);
    let corrupt = |e: rusqlite::Error| {
        DocsetError::corrupt(target, format!("cannot read {}: {e}", path.display()))
    };

    let conn = Connection::open_with_flags(
        &path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(corrupt)?;

    let flat: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND lower(name) = 'searchindex'",
            [],
            |row| row.get(0),
        )
        .map_err(corrupt)?;
    let query = if flat > 0 { FLAT_QUERY } else { CORE_DATA_QUERY };
    debug!(docset = target, flat = flat > 0, "Reading Dash index");

    let mut statement = conn.prepare(query).map_err(corrupt)?;
    let raw = statement
        .query_map([], |row| {
            Ok(RawSymbol {
                name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                kind: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                fragment: row.get(3)?,
            })
        })
        .map_err(corrupt)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(corrupt)?;

    Ok(DocsetIndex::from_raw(target, raw))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::docset::{SymbolCategory, CONTENT_DIR};
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const BASH_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>bash</string>
    <key>CFBundleName</key>
    <string>GNU Bash</string>
    <key>DocSetPlatformFamily</key>
    <string>bash</string>
    <key>DashDocSetFamily</key>
    <string>dashtoc</string>
    <key>dashIndexFilePath</key>
    <string>index.html</string>
    <key>isDashDocset</key>
    <true/>
    <key>isJavaScriptEnabled</key>
    <false/>
</dict>
</plist>"#;

    /// A flat-index Dash bundle with two symbols and one unknown type
    pub(crate) fn write_dash_bundle(root: &Path) {
        let resources = resources_dir(root);
        fs::create_dir_all(resources.join(CONTENT_DIR)).unwrap();
        fs::write(resources.join(CONTENT_DIR).join("index.html"), "<html></html>").unwrap();
        fs::write(root.join(CONTENTS_DIR).join("Info.plist"), BASH_PLIST).unwrap();

        let conn = Connection::open(index_path(root)).unwrap();
        conn.execute_batch(
            "CREATE TABLE searchIndex(id INTEGER PRIMARY KEY, name TEXT, type TEXT, path TEXT);
             INSERT INTO searchIndex(name, type, path) VALUES
                 ('echo', 'Function', '<dash_entry_name=echo>builtins.html#echo'),
                 ('BASH_VERSION', 'Variable', 'variables.html#BASH_VERSION'),
                 ('ignored', 'NoSuchType', 'x.html');",
        )
        .unwrap();
    }

    #[test]
    fn test_parse_info_plist() {
        let plist = InfoPlist::parse("bash", BASH_PLIST).unwrap();
        assert_eq!(
            plist,
            InfoPlist {
                bundle_name: Some("GNU Bash".to_string()),
                keywords: vec!["bash".to_string()],
                index_file_path: Some("index.html".to_string()),
                is_java_script_enabled: Some(false),
            }
        );
    }

    #[test]
    fn test_plist_keywords_in_order_without_repeats() {
        let plist = InfoPlist::parse(
            "qt",
            "<plist><dict>
                <key>DashDocSetFamily</key><string>cpp</string>
                <key>DashDocSetKeyword</key><string>qt</string>
                <key>DashDocSetPluginKeyword</key><string>qt5</string>
                <key>DocSetPlatformFamily</key><string>qt</string>
             </dict></plist>",
        )
        .unwrap();
        assert_eq!(plist.keywords, vec!["qt", "qt5", "cpp"]);
        assert_eq!(plist.bundle_name, None);
    }

    #[test]
    fn test_read_flat_index() {
        let dir = TempDir::new().unwrap();
        write_dash_bundle(dir.path());

        let index = read_index("bash", dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.skipped(), 1);

        let echo = &index.lookup_exact("echo")[0];
        assert_eq!(echo.category, SymbolCategory::Function);
        assert_eq!(echo.location, "builtins.html#echo");
    }

    #[test]
    fn test_read_core_data_index() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(resources_dir(dir.path())).unwrap();
        let conn = Connection::open(index_path(dir.path())).unwrap();
        conn.execute_batch(
            "CREATE TABLE ztokentype(z_pk INTEGER PRIMARY KEY, ztypename TEXT);
             CREATE TABLE zfilepath(z_pk INTEGER PRIMARY KEY, zpath TEXT);
             CREATE TABLE ztokenmetainformation(z_pk INTEGER PRIMARY KEY, zfile INTEGER, zanchor TEXT);
             CREATE TABLE ztoken(z_pk INTEGER PRIMARY KEY, ztokenname TEXT, ztokentype INTEGER, zmetainformation INTEGER);
             INSERT INTO ztokentype VALUES (1, 'cl'), (2, 'instm');
             INSERT INTO zfilepath VALUES (1, 'Classes/NSString.html');
             INSERT INTO ztokenmetainformation VALUES (1, 1, NULL), (2, 1, '//apple_ref/occ/instm/NSString/length');
             INSERT INTO ztoken VALUES (1, 'NSString', 1, 1), (2, 'length', 2, 2);",
        )
        .unwrap();
        drop(conn);

        let index = read_index("cocoa", dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.lookup_exact("NSString")[0].location,
            "Classes/NSString.html"
        );
        let length = &index.lookup_exact("length")[0];
        assert_eq!(length.category, SymbolCategory::Method);
        assert_eq!(
            length.location,
            "Classes/NSString.html#//apple_ref/occ/instm/NSString/length"
        );
    }

    #[test]
    fn test_unreadable_index_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(resources_dir(dir.path())).unwrap();
        fs::write(index_path(dir.path()), "not a database").unwrap();

        let err = read_index("broken", dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptDocset);
        assert_eq!(err.target, "broken");
    }
}
