//! File-backed container.
//!
//! On-disk layout:
//!
//! ```text
//! +------------+-----------------------------+-----------+
//! | superblock | chunks and old directories  | directory |
//! +------------+-----------------------------+-----------+
//! 0            40                                        eof
//! ```
//!
//! Every mutation writes its new chunks first, then a fresh directory at
//! the end of the file, and finally rewrites the superblock to point at
//! it. Until the superblock is rewritten the previous state is what a
//! reader sees, so a failed create leaves no table behind.
//!
//! Uncompressed chunks are allocated at full chunk capacity and updated in
//! place. Deflated chunks are immutable: changing one writes a new copy at
//! the end of the file.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use puretable_format::filters::{deflate_compress, deflate_decompress};
use puretable_format::table_header::check_name_len;
use puretable_format::{ChunkEntry, Directory, FormatError, Superblock, TableHeader, SUPERBLOCK_SIZE};
use tracing::{debug, info};

use crate::container::{check_range, check_whole_records, Container, TableDescription};
use crate::error::StorageError;
use crate::library::{self, FileLease};

/// How a container file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read tables; every mutation fails with [`StorageError::ReadOnly`].
    ReadOnly,
    /// Read and modify an existing container.
    ReadWrite,
    /// Create a new, empty container, replacing any existing file.
    CreateTruncate,
}

impl OpenMode {
    fn writable(self) -> bool {
        self != OpenMode::ReadOnly
    }
}

/// A container stored in a single file.
///
/// The file handle and the process-wide registration are released when the
/// container is dropped; [`FileContainer::close`] does the same but reports
/// a failing final sync.
#[derive(Debug)]
pub struct FileContainer {
    file: File,
    path: PathBuf,
    mode: OpenMode,
    superblock: Superblock,
    directory: Directory,
    _lease: FileLease,
}

/// Absolute form of `path` that is stable whether or not the file exists yet.
fn normalize(path: &Path) -> io::Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "container path has no file name")
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Ok(parent.canonicalize()?.join(name))
}

fn records_in_chunk(header: &TableHeader, index: usize) -> u64 {
    let first = index as u64 * header.chunk_records;
    header.chunk_records.min(header.nrecords.saturating_sub(first))
}

impl FileContainer {
    /// Create a new container at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::open(path, OpenMode::CreateTruncate)
    }

    /// Open a container file.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, StorageError> {
        let path = normalize(path.as_ref())?;
        // register before touching the file so a conflicting open never truncates it
        let lease = library::acquire(&path, mode.writable())?;

        let file = match mode {
            OpenMode::ReadOnly => File::open(&path)?,
            OpenMode::ReadWrite => OpenOptions::new().read(true).write(true).open(&path)?,
            OpenMode::CreateTruncate => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?,
        };

        let (superblock, directory) = if mode == OpenMode::CreateTruncate {
            let directory = Directory::default();
            let dir_bytes = directory.serialize();
            let superblock = Superblock::empty(dir_bytes.len() as u64);
            let mut f = &file;
            f.write_all(&superblock.serialize())?;
            f.write_all(&dir_bytes)?;
            file.sync_all()?;
            (superblock, directory)
        } else {
            Self::load_metadata(&file)?
        };

        info!(
            path = %path.display(),
            ?mode,
            tables = directory.tables.len(),
            "container opened"
        );

        Ok(Self {
            file,
            path,
            mode,
            superblock,
            directory,
            _lease: lease,
        })
    }

    fn load_metadata(file: &File) -> Result<(Superblock, Directory), StorageError> {
        let file_len = file.metadata()?.len();
        if file_len < SUPERBLOCK_SIZE as u64 {
            return Err(FormatError::UnexpectedEof {
                expected: SUPERBLOCK_SIZE,
                available: file_len as usize,
            }
            .into());
        }
        let mut sb_bytes = [0u8; SUPERBLOCK_SIZE];
        let mut f = file;
        f.seek(SeekFrom::Start(0))?;
        f.read_exact(&mut sb_bytes)?;
        let superblock = Superblock::parse(&sb_bytes)?;

        let dir_end = superblock
            .directory_address
            .checked_add(superblock.directory_length)
            .filter(|&end| end <= file_len && end <= superblock.eof_address)
            .ok_or_else(|| StorageError::Corrupt("directory lies outside the file".into()))?;
        let mut dir_bytes = vec![0u8; (dir_end - superblock.directory_address) as usize];
        f.seek(SeekFrom::Start(superblock.directory_address))?;
        f.read_exact(&mut dir_bytes)?;
        let directory = Directory::parse(&dir_bytes)?;

        for header in &directory.tables {
            Self::validate_header(header, superblock.eof_address)?;
        }
        Ok((superblock, directory))
    }

    fn validate_header(header: &TableHeader, eof: u64) -> Result<(), StorageError> {
        if header.chunk_records == 0 || header.record_size() == 0 {
            return Err(StorageError::Corrupt(format!(
                "table `{}` has an empty record or chunk size",
                header.name
            )));
        }
        if header.chunk_bytes().is_err() {
            return Err(StorageError::Corrupt(format!(
                "table `{}` declares chunks of {} records, over the chunk size limit",
                header.name, header.chunk_records
            )));
        }
        if header.chunks.len() != header.chunks_for(header.nrecords) {
            return Err(StorageError::Corrupt(format!(
                "table `{}` indexes {} chunks for {} records",
                header.name,
                header.chunks.len(),
                header.nrecords
            )));
        }
        let outside = header
            .chunks
            .iter()
            .any(|c| c.address.checked_add(c.stored_size).map_or(true, |end| end > eof));
        if outside {
            return Err(StorageError::Corrupt(format!(
                "table `{}` has a chunk beyond the end of the file",
                header.name
            )));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Flush file contents to stable storage.
    pub fn flush(&self) -> Result<(), StorageError> {
        if self.mode.writable() {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Close the container, reporting a failing final sync.
    pub fn close(self) -> Result<(), StorageError> {
        self.flush()?;
        debug!(path = %self.path.display(), "container closed");
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), StorageError> {
        if self.mode.writable() {
            Ok(())
        } else {
            Err(StorageError::ReadOnly(self.path.clone()))
        }
    }

    fn header(&self, name: &str) -> Result<&TableHeader, StorageError> {
        self.directory
            .get(name)
            .ok_or_else(|| StorageError::Missing(name.to_string()))
    }

    fn read_at(&self, address: u64, len: usize) -> Result<Vec<u8>, StorageError> {
        let mut buf = vec![0u8; len];
        let mut f = &self.file;
        f.seek(SeekFrom::Start(address))?;
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&self, address: u64, data: &[u8]) -> Result<(), StorageError> {
        let mut f = &self.file;
        f.seek(SeekFrom::Start(address))?;
        f.write_all(data)?;
        Ok(())
    }

    /// Valid record bytes of chunk `index`.
    fn load_chunk(&self, header: &TableHeader, index: usize) -> Result<Vec<u8>, StorageError> {
        let entry = header.chunks[index];
        let valid = records_in_chunk(header, index) as usize * header.record_size();
        if header.deflate_level.is_some() {
            let stored = self.read_at(entry.address, entry.stored_size as usize)?;
            Ok(deflate_decompress(&stored, valid)?)
        } else {
            self.read_at(entry.address, valid)
        }
    }

    /// Write a chunk holding `data` at the end of the file.
    ///
    /// Uncompressed chunks reserve their full capacity; the unwritten tail
    /// is only ever read after an append has filled it.
    fn store_chunk(
        &self,
        header: &TableHeader,
        data: &[u8],
        eof: &mut u64,
    ) -> Result<ChunkEntry, StorageError> {
        let entry = match header.deflate_level {
            Some(level) => {
                let compressed = deflate_compress(data, level)?;
                self.write_at(*eof, &compressed)?;
                ChunkEntry {
                    address: *eof,
                    stored_size: compressed.len() as u64,
                }
            }
            None => {
                self.write_at(*eof, data)?;
                ChunkEntry {
                    address: *eof,
                    stored_size: header.chunk_bytes()? as u64,
                }
            }
        };
        *eof += entry.stored_size;
        Ok(entry)
    }

    /// Make `directory` the visible state of the container.
    fn commit(&mut self, directory: Directory, eof: u64) -> Result<(), StorageError> {
        let dir_bytes = directory.serialize();
        self.write_at(eof, &dir_bytes)?;
        self.file.sync_data()?;

        let superblock = Superblock {
            version: self.superblock.version,
            directory_address: eof,
            directory_length: dir_bytes.len() as u64,
            eof_address: eof + dir_bytes.len() as u64,
        };
        self.write_at(0, &superblock.serialize())?;
        // the file now points at the new directory, whether or not the sync lands
        self.superblock = superblock;
        self.directory = directory;
        self.file.sync_data()?;

        debug!(
            directory_address = superblock.directory_address,
            eof = superblock.eof_address,
            "directory committed"
        );
        Ok(())
    }

    fn commit_header(&mut self, header: TableHeader, eof: u64) -> Result<(), StorageError> {
        let mut directory = self.directory.clone();
        match directory.get_mut(&header.name) {
            Some(slot) => *slot = header,
            None => directory.tables.push(header),
        }
        self.commit(directory, eof)
    }
}

impl Container for FileContainer {
    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory.tables.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    fn describe_table(&self, name: &str) -> Result<Option<TableDescription>, StorageError> {
        Ok(self.directory.get(name).map(|h| TableDescription {
            title: h.title.clone(),
            datatype: h.datatype.clone(),
            nrecords: h.nrecords,
            chunk_records: h.chunk_records,
            deflate_level: h.deflate_level,
        }))
    }

    fn create_table(
        &mut self,
        name: &str,
        description: &TableDescription,
        records: &[u8],
    ) -> Result<(), StorageError> {
        self.ensure_writable()?;
        if self.directory.get(name).is_some() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        if description.chunk_records == 0 {
            return Err(StorageError::Corrupt("chunk size of zero records".into()));
        }
        check_name_len(name)?;
        check_name_len(&description.title)?;
        let nrecords = check_whole_records(records, description.record_size())?;

        let mut header = TableHeader {
            name: name.to_string(),
            title: description.title.clone(),
            datatype: description.datatype.clone(),
            nrecords,
            chunk_records: description.chunk_records,
            deflate_level: description.deflate_level,
            chunks: Vec::new(),
        };
        let mut eof = self.superblock.eof_address;
        let chunk_bytes = header.chunk_bytes()?;
        for data in records.chunks(chunk_bytes) {
            let entry = self.store_chunk(&header, data, &mut eof)?;
            header.chunks.push(entry);
        }
        self.commit_header(header, eof)?;
        info!(table = name, nrecords, "table created");
        Ok(())
    }

    fn append_records(&mut self, name: &str, records: &[u8]) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let mut header = self.header(name)?.clone();
        let record_size = header.record_size();
        let added = check_whole_records(records, record_size)?;
        if added == 0 {
            return Ok(());
        }

        let mut eof = self.superblock.eof_address;
        let mut pending = records;
        let used = (header.nrecords % header.chunk_records) as usize;
        if used != 0 {
            // top up the partially filled last chunk
            let last = header.chunks.len() - 1;
            let room = (header.chunk_records as usize - used) * record_size;
            let take = room.min(pending.len());
            if header.deflate_level.is_some() {
                let mut data = self.load_chunk(&header, last)?;
                data.extend_from_slice(&pending[..take]);
                let entry = self.store_chunk(&header, &data, &mut eof)?;
                header.chunks[last] = entry;
            } else {
                let address = header.chunks[last].address + (used * record_size) as u64;
                self.write_at(address, &pending[..take])?;
            }
            pending = &pending[take..];
        }
        let chunk_bytes = header.chunk_bytes()?;
        for data in pending.chunks(chunk_bytes) {
            let entry = self.store_chunk(&header, data, &mut eof)?;
            header.chunks.push(entry);
        }
        header.nrecords += added;
        let nrecords = header.nrecords;
        self.commit_header(header, eof)?;
        debug!(table = name, added, nrecords, "records appended");
        Ok(())
    }

    fn write_records(&mut self, name: &str, start: u64, records: &[u8]) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let mut header = self.header(name)?.clone();
        let record_size = header.record_size();
        let count = check_whole_records(records, record_size)?;
        check_range(start, count, header.nrecords)?;
        if count == 0 {
            return Ok(());
        }

        let cr = header.chunk_records;
        let end = start + count;
        let mut eof = self.superblock.eof_address;
        for index in (start / cr) as usize..=((end - 1) / cr) as usize {
            let chunk_start = index as u64 * cr;
            let lo = start.max(chunk_start);
            let hi = end.min(chunk_start + cr);
            let src = &records[((lo - start) as usize * record_size)..((hi - start) as usize * record_size)];
            let within = (lo - chunk_start) as usize * record_size;
            if header.deflate_level.is_some() {
                let mut data = self.load_chunk(&header, index)?;
                data[within..within + src.len()].copy_from_slice(src);
                let entry = self.store_chunk(&header, &data, &mut eof)?;
                header.chunks[index] = entry;
            } else {
                self.write_at(header.chunks[index].address + within as u64, src)?;
            }
        }

        if header.deflate_level.is_some() {
            self.commit_header(header, eof)?;
        } else {
            self.file.sync_data()?;
        }
        debug!(table = name, start, count, "records overwritten");
        Ok(())
    }

    fn read_records(&self, name: &str, start: u64, count: u64) -> Result<Vec<u8>, StorageError> {
        let header = self.header(name)?;
        check_range(start, count, header.nrecords)?;
        let record_size = header.record_size();
        let mut out = Vec::with_capacity(count as usize * record_size);
        if count == 0 {
            return Ok(out);
        }

        let cr = header.chunk_records;
        let end = start + count;
        for index in (start / cr) as usize..=((end - 1) / cr) as usize {
            let chunk_start = index as u64 * cr;
            let lo = (start.max(chunk_start) - chunk_start) as usize * record_size;
            let hi = (end.min(chunk_start + cr) - chunk_start) as usize * record_size;
            if header.deflate_level.is_some() {
                let data = self.load_chunk(header, index)?;
                out.extend_from_slice(&data[lo..hi]);
            } else {
                let address = header.chunks[index].address + lo as u64;
                out.extend_from_slice(&self.read_at(address, hi - lo)?);
            }
        }
        Ok(out)
    }
}
