//! Reads the database file header, as defined at https://www.sqlite.org/fileformat.html#the_database_header
//!
//! The header is read straight from the file, without a connection, so it shows what is on disk
//! (e.g. the schema cookie after a schema update was committed).

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("The magic bytes for this file are wrong: {0}.")]
    WrongMagic(String),
    #[error("A field value is invalid per the Sqlite format spec (version 3.0.0): {0}.")]
    Invalid(&'static str),
    #[error("Error reading file.")]
    ReadFailed,
    #[error("Error opening db file.")]
    OpenFailed,
}

/// The fields of the 100 byte database file header this tool reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbfileHeader {
    pub pagesize: u32,
    pub changecnt: u32,
    pub numpages: u32,
    /// Also known as the schema version; `PRAGMA schema_version` reads the same value.
    pub schema_cookie: u32,
    pub schema_format: u32,
    pub text_encoding: u32,
    pub user_version: u32,
}

impl DbfileHeader {
    pub fn text_encoding_name(&self) -> &'static str {
        match self.text_encoding {
            1 => "UTF-8",
            2 => "UTF-16le",
            3 => "UTF-16be",
            _ => "unknown",
        }
    }
}

const SQLITE3_MAGIC_STRING: &[u8] = b"SQLite format 3\0";

pub fn read_header(path: impl AsRef<Path>) -> Result<DbfileHeader, Error> {
    let mut f = std::fs::File::open(path).map_err(|_| Error::OpenFailed)?;
    get_header(&mut f)
}

pub fn get_header<R: Read + Seek>(f: &mut R) -> Result<DbfileHeader, Error> {
    f.seek(SeekFrom::Start(0)).map_err(|_| Error::ReadFailed)?;
    // Offset	Size	Description
    // 0        16	    The header string: "SQLite format 3\000"
    let mut fileid_buffer = [0; 16];
    f.read_exact(&mut fileid_buffer)
        .map_err(|_| Error::ReadFailed)?;
    if fileid_buffer != SQLITE3_MAGIC_STRING {
        return Err(Error::WrongMagic(hex::encode(fileid_buffer)));
    }

    // 16	    2	    The database page size in bytes. Must be a power of two between 512 and 32768 inclusive, or the value 1 representing a page size of 65536.
    let pagesize: u32 = match f.read_u16::<BigEndian>().map_err(|_| Error::ReadFailed)? {
        1 => 65536,
        x if x >= 512 && x.is_power_of_two() => x as u32,
        _ => return Err(Error::Invalid("page size")),
    };

    // 18	    1	    File format write version. 1 for legacy; 2 for WAL.
    // 19	    1	    File format read version. 1 for legacy; 2 for WAL.
    // 20	    1	    Bytes of unused "reserved" space at the end of each page.
    // 21	    1	    Maximum embedded payload fraction. Must be 64.
    // 22	    1	    Minimum embedded payload fraction. Must be 32.
    // 23	    1	    Leaf payload fraction. Must be 32.
    let mut bytes_18_to_23 = [0; 6];
    f.read_exact(&mut bytes_18_to_23)
        .map_err(|_| Error::ReadFailed)?;
    if bytes_18_to_23[3..] != [0x40_u8, 0x20, 0x20] {
        return Err(Error::Invalid("payload fractions"));
    }

    // 24	    4	    File change counter.
    // 28	    4	    Size of the database file in pages. The "in-header database size".
    // 32	    4	    Page number of the first freelist trunk page.
    // 36	    4	    Total number of freelist pages.
    // 40	    4	    The schema cookie.
    // 44	    4	    The schema format number. Supported schema formats are 1, 2, 3, and 4.
    let changecnt = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let numpages = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let _freelist_trunk = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let _freelist_pages = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let schema_cookie = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let schema_format = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    if schema_format > 4 {
        return Err(Error::Invalid("schema format"));
    }

    // 48	    4	    Default page cache size.
    // 52	    4	    The page number of the largest root b-tree page when in auto-vacuum or incremental-vacuum modes, or zero otherwise.
    // 56	    4	    The database text encoding. A value of 1 means UTF-8. A value of 2 means UTF-16le. A value of 3 means UTF-16be.
    // 60	    4	    The "user version" as read and set by the user_version pragma.
    let _cache_size = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let _largest_root = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let text_encoding = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;
    let user_version = f.read_u32::<BigEndian>().map_err(|_| Error::ReadFailed)?;

    f.seek(SeekFrom::Start(0)).map_err(|_| Error::ReadFailed)?;
    Ok(DbfileHeader {
        pagesize,
        changecnt,
        numpages,
        schema_cookie,
        schema_format,
        text_encoding,
        user_version,
    })
}

#[test]
fn test_read_header_matches_pragmas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("header.sqlite");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "PRAGMA user_version = 7;
         CREATE TABLE a (b INT);
         CREATE TABLE c (d TEXT);",
    )
    .unwrap();
    let page_size: u32 = conn.query_row("PRAGMA page_size", [], |r| r.get(0)).unwrap();
    let schema_version: u32 = conn.query_row("PRAGMA schema_version", [], |r| r.get(0)).unwrap();
    drop(conn);

    let hdr = read_header(&path).unwrap();
    assert_eq!(hdr.pagesize, page_size);
    assert_eq!(hdr.schema_cookie, schema_version);
    assert_eq!(hdr.user_version, 7);
    assert_eq!(hdr.numpages, 3);
    assert_eq!(hdr.text_encoding_name(), "UTF-8");
}

#[test]
fn test_wrong_magic() {
    let mut c = std::io::Cursor::new(vec![b'x'; 100]);
    assert_eq!(
        get_header(&mut c),
        Err(Error::WrongMagic("78".repeat(16)))
    );
}

#[test]
fn test_short_file() {
    let mut c = std::io::Cursor::new(SQLITE3_MAGIC_STRING.to_vec());
    assert_eq!(get_header(&mut c), Err(Error::ReadFailed));
    assert_eq!(read_header("/nonexistent/dir/x.sqlite"), Err(Error::OpenFailed));
}
