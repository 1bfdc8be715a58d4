use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binrw::io::Cursor;
use binrw::BinReaderExt;
use memmap2::Mmap;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::compression::{self, CompressionCodec, CompressionError, ZlibCompression};
use crate::resource::index_entry::{FileSizeField, IndexRecord, ResourceIndexEntry};
use crate::resource::package_header::PackageHeader;
use crate::resource::package_index::PackageIndex;
use crate::resource::package_writer::{PackageWriter, WrittenPackage};
use crate::resource::resource_key::ResourceKey;
use crate::utils::{self, CancellationToken};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Parsing error: {0}")]
    ParsingError(#[from] binrw::Error),

    #[error("Corrupt package header: {0}")]
    CorruptHeader(String),

    #[error("Index table of {size} bytes at {position} lies outside the {file_len} byte package")]
    IndexOutOfRange {
        position: u64,
        size: u64,
        file_len: u64,
    },

    #[error("Corrupt index record for {key}: {reason}")]
    CorruptIndex { key: ResourceKey, reason: String },

    #[error("Couldn't find resource {0} inside of the package")]
    ResourceNotFound(ResourceKey),

    #[error("The package was opened read-only")]
    ReadOnlyViolation,

    #[error("Compression error: {0}")]
    CompressionError(#[from] CompressionError),

    #[error("The operation was cancelled")]
    Cancelled,

    #[error("Too many resources in the package")]
    TooManyResources,

    #[error("The package grew past the 4 GiB the format can address")]
    PackageTooLarge,

    #[error("Resource {0} is too large to be stored in a package")]
    ResourceTooLarge(ResourceKey),
}

/// Where the bytes of loaded resources live.
#[derive(Clone)]
pub(crate) enum PackageSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Options for opening a package from disk.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    read_only: bool,
    cancellation: Option<CancellationToken>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every mutation and save on the opened package.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Aborts the load between index records once the token is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Options for writing a package.
#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    pub(crate) timestamp: Option<u64>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the header with a fixed modification time instead of the current time,
    /// making the output reproducible.
    pub fn with_timestamp(mut self, unix_seconds: u64) -> Self {
        self.timestamp = Some(unix_seconds);
        self
    }

    /// Aborts the save between resources once the token is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

pub(crate) fn check_cancelled(token: Option<&CancellationToken>) -> Result<(), PackageError> {
    match token {
        Some(token) if token.is_cancelled() => Err(PackageError::Cancelled),
        _ => Ok(()),
    }
}

/// A DBPF package: a header, an index of resources, and the resource payloads.
///
/// Only the header and index are parsed when a package is opened; payloads are read on demand.
/// Mutations are staged in memory and written out by one of the save methods, which always
/// rewrite the whole package.
pub struct Package {
    header: PackageHeader,
    index: PackageIndex,
    source: Option<PackageSource>,
    // Stored (possibly compressed) bytes of resources added since the last save.
    staged: HashMap<ResourceKey, Vec<u8>>,
    compression: Arc<dyn CompressionCodec>,
    read_only: bool,
    dirty: bool,
}

impl Package {
    /// Creates a package without any resources.
    pub fn create_empty() -> Self {
        Self::create_empty_at(utils::unix_timestamp())
    }

    /// Creates a package without any resources, with a fixed creation time.
    pub fn create_empty_at(created_at: u64) -> Self {
        Self {
            header: PackageHeader::new(created_at),
            index: PackageIndex::new(),
            source: None,
            staged: HashMap::new(),
            compression: Arc::new(ZlibCompression::default()),
            read_only: false,
            dirty: false,
        }
    }

    /// Opens a package from a file for reading and writing.
    pub fn open<P: AsRef<Path>>(package_path: P) -> Result<Self, PackageError> {
        Self::open_with(package_path, &OpenOptions::new())
    }

    pub fn open_read_only<P: AsRef<Path>>(package_path: P) -> Result<Self, PackageError> {
        Self::open_with(package_path, &OpenOptions::new().read_only(true))
    }

    /// Parses a package file's header and index.
    ///
    /// # Arguments
    /// * `package_path` - The path to the file to parse.
    /// * `options` - Read-only mode and cancellation.
    pub fn open_with<P: AsRef<Path>>(
        package_path: P,
        options: &OpenOptions,
    ) -> Result<Self, PackageError> {
        let package_path = package_path.as_ref();
        let file = File::open(package_path)?;

        let file_len = file.metadata()?.len();
        if file_len < PackageHeader::SIZE {
            return Err(PackageError::CorruptHeader(format!(
                "file is {file_len} bytes, shorter than the header"
            )));
        }

        // The map only lives for the duration of the parse, payloads are read through the path.
        let mmap = unsafe { Mmap::map(&file)? };
        let (header, index) = Self::parse(&mmap[..], options.cancellation.as_ref())?;

        tracing::debug!(
            "Opened {}: {} active resources",
            package_path.display(),
            index.active_count()
        );

        Ok(Self {
            header,
            index,
            source: Some(PackageSource::File(package_path.to_path_buf())),
            staged: HashMap::new(),
            compression: Arc::new(ZlibCompression::default()),
            read_only: options.read_only,
            dirty: false,
        })
    }

    /// Parses a package from a memory buffer.
    pub fn from_memory(data: Vec<u8>) -> Result<Self, PackageError> {
        let (header, index) = Self::parse(&data, None)?;
        Ok(Self {
            header,
            index,
            source: Some(PackageSource::Memory(data)),
            staged: HashMap::new(),
            compression: Arc::new(ZlibCompression::default()),
            read_only: false,
            dirty: false,
        })
    }

    /// Replaces the codec used to compress new payloads.
    ///
    /// Stored payloads are decompressed with the codec their record's tag names; this one is the
    /// default for records with an unknown tag.
    pub fn with_compression(mut self, compression: Arc<dyn CompressionCodec>) -> Self {
        self.compression = compression;
        self
    }

    fn parse(
        data: &[u8],
        cancellation: Option<&CancellationToken>,
    ) -> Result<(PackageHeader, PackageIndex), PackageError> {
        let file_len = data.len() as u64;
        if file_len < PackageHeader::SIZE {
            return Err(PackageError::CorruptHeader(format!(
                "file is {file_len} bytes, shorter than the header"
            )));
        }

        let mut reader = Cursor::new(data);
        let header: PackageHeader = reader.read_le()?;
        if !header.has_valid_magic() {
            return Err(PackageError::CorruptHeader(format!(
                "bad magic {:02X?}",
                header.magic
            )));
        }
        tracing::debug!("Package header: {header}");

        if !header.has_index() {
            return Ok((header, PackageIndex::new()));
        }

        let position = header.resolved_index_position();
        let table_size = header.expected_index_size();
        if position
            .checked_add(table_size)
            .map_or(true, |end| end > file_len)
        {
            return Err(PackageError::IndexOutOfRange {
                position,
                size: table_size,
                file_len,
            });
        }
        if u64::from(header.index_size) != table_size {
            tracing::warn!(
                "Header announces an index of {} bytes, {} records take {} bytes",
                header.index_size,
                header.resource_count,
                table_size
            );
        }

        reader.seek(SeekFrom::Start(position))?;
        let layout = header.instance_layout();
        let mut index = PackageIndex::with_capacity(header.resource_count as usize);

        for _ in 0..header.resource_count {
            check_cancelled(cancellation)?;

            let record: IndexRecord = reader.read_le_args((layout,))?;
            let entry = record.to_entry();

            if !entry.is_deleted {
                Self::validate_range(&entry, file_len)?;
            }

            if let Some(previous) = index.insert_or_replace(entry) {
                tracing::debug!("Duplicate index record for {}, keeping the later one", previous.key);
            }
        }

        Ok((header, index))
    }

    fn validate_range(entry: &ResourceIndexEntry, file_len: u64) -> Result<(), PackageError> {
        match entry.end_offset() {
            Some(end) if end <= file_len => Ok(()),
            _ => Err(PackageError::CorruptIndex {
                key: entry.key,
                reason: format!(
                    "{} bytes at {} extend past the end of the {} byte package",
                    entry.stored_size, entry.file_offset, file_len
                ),
            }),
        }
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    pub fn index(&self) -> &PackageIndex {
        &self.index
    }

    pub fn compression(&self) -> &Arc<dyn CompressionCodec> {
        &self.compression
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the package has changes that have not been saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            Some(PackageSource::File(path)) => Some(path),
            _ => None,
        }
    }

    /// Number of live resources.
    pub fn resource_count(&self) -> usize {
        self.index.active_count()
    }

    pub fn find(&self, key: &ResourceKey) -> Option<&ResourceIndexEntry> {
        self.index.lookup(key)
    }

    pub fn has_resource(&self, key: &ResourceKey) -> bool {
        self.index.contains(key)
    }

    /// Live index entries in index order.
    pub fn entries(&self) -> impl Iterator<Item = &ResourceIndexEntry> + '_ {
        self.index.iter_active()
    }

    /// Reads and, if needed, decompresses the resource stored under `key`.
    pub fn read_resource(&self, key: &ResourceKey) -> Result<Vec<u8>, PackageError> {
        let entry = self
            .index
            .lookup(key)
            .ok_or(PackageError::ResourceNotFound(*key))?;
        self.read_resource_entry(entry)
    }

    /// Reads and, if needed, decompresses the resource described by `entry`.
    pub fn read_resource_entry(&self, entry: &ResourceIndexEntry) -> Result<Vec<u8>, PackageError> {
        let stored = self.read_stored_bytes(entry)?;
        if !entry.is_compressed {
            return Ok(stored);
        }
        Ok(self
            .decompressor_for(entry)
            .decompress(&stored, entry.memory_size)?)
    }

    fn decompressor_for(&self, entry: &ResourceIndexEntry) -> &dyn CompressionCodec {
        if entry.flags == self.compression.compression_tag() {
            return self.compression.as_ref();
        }
        compression::codec_for_tag(entry.flags).unwrap_or(self.compression.as_ref())
    }

    /// Reads the bytes of a resource exactly as they are stored, without decompressing.
    pub fn read_stored_bytes(&self, entry: &ResourceIndexEntry) -> Result<Vec<u8>, PackageError> {
        self.blob_reader().stored_bytes(entry)
    }

    pub(crate) fn blob_reader(&self) -> BlobReader<'_> {
        BlobReader {
            package: self,
            file: None,
        }
    }

    /// Adds a resource, replacing any existing resource with the same key.
    ///
    /// # Arguments
    /// * `key` - The key of the resource.
    /// * `data` - The uncompressed resource data.
    /// * `compress` - Whether to store the data compressed with the package's codec.
    pub fn add_resource(
        &mut self,
        key: ResourceKey,
        data: Vec<u8>,
        compress: bool,
    ) -> Result<(), PackageError> {
        self.ensure_writable()?;
        let memory_size = Self::checked_size(key, data.len())?;

        if compress {
            let compressed = self.compression.compress(&data)?;
            self.stage(key, compressed, memory_size, true)
        } else {
            self.stage(key, data, memory_size, false)
        }
    }

    /// Adds a resource already compressed with the package's codec, replacing any existing
    /// resource with the same key.
    pub fn add_compressed_resource(
        &mut self,
        key: ResourceKey,
        compressed: Vec<u8>,
        memory_size: u32,
    ) -> Result<(), PackageError> {
        self.ensure_writable()?;
        self.stage(key, compressed, memory_size, true)
    }

    fn stage(
        &mut self,
        key: ResourceKey,
        stored: Vec<u8>,
        memory_size: u32,
        is_compressed: bool,
    ) -> Result<(), PackageError> {
        let stored_size = Self::checked_size(key, stored.len())?;
        let flags = if is_compressed {
            self.compression.compression_tag()
        } else {
            0
        };
        let entry = ResourceIndexEntry::new(key, 0, stored_size, memory_size)
            .compressed(is_compressed)
            .with_flags(flags);

        if self.index.insert_or_replace(entry).is_some() {
            tracing::trace!("Replacing resource {key}");
        }
        self.staged.insert(key, stored);
        self.dirty = true;
        Ok(())
    }

    fn checked_size(key: ResourceKey, len: usize) -> Result<u32, PackageError> {
        u32::try_from(len)
            .ok()
            .filter(|size| *size <= FileSizeField::MAX_SIZE)
            .ok_or(PackageError::ResourceTooLarge(key))
    }

    /// Marks the resource as deleted. Returns false if there was no such resource.
    pub fn remove_resource(&mut self, key: &ResourceKey) -> Result<bool, PackageError> {
        self.ensure_writable()?;
        let removed = self.index.mark_deleted(key);
        if removed {
            self.staged.remove(key);
            self.dirty = true;
        }
        Ok(removed)
    }

    /// Drops deleted entries from the index. Returns how many were dropped.
    pub fn compact(&mut self) -> Result<usize, PackageError> {
        self.ensure_writable()?;
        let dropped = self.index.compact();
        if dropped > 0 {
            self.dirty = true;
        }
        Ok(dropped)
    }

    /// Sets the format version written by the next save.
    /// The minor version decides the on-disk layout of resource instances.
    pub fn set_format_version(&mut self, major: u32, minor: u32) -> Result<(), PackageError> {
        self.ensure_writable()?;
        self.header.major_version = major;
        self.header.minor_version = minor;
        self.dirty = true;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), PackageError> {
        if self.read_only {
            return Err(PackageError::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Writes the whole package to `writer`.
    ///
    /// The package itself is left untouched; use [Package::save] to also rebind it to the output.
    pub fn write_to<W: Write + Seek>(
        &self,
        writer: &mut W,
        options: &SaveOptions,
    ) -> Result<WrittenPackage, PackageError> {
        self.ensure_writable()?;
        PackageWriter::new(self, options).write(writer)
    }

    /// Writes the whole package into a byte vector.
    pub fn to_bytes(&self, options: &SaveOptions) -> Result<Vec<u8>, PackageError> {
        let mut writer = Cursor::new(vec![]);
        self.write_to(&mut writer, options)?;
        Ok(writer.into_inner())
    }

    pub fn save<P: AsRef<Path>>(&mut self, output_path: P) -> Result<(), PackageError> {
        self.save_with(output_path, &SaveOptions::new())
    }

    /// Writes the package to `output_path` through a temporary file that replaces the
    /// destination only once everything was written.
    ///
    /// On success the package is rebound to the new file: offsets are updated, staged data and
    /// tombstones are dropped and the package is no longer dirty.
    pub fn save_with<P: AsRef<Path>>(
        &mut self,
        output_path: P,
        options: &SaveOptions,
    ) -> Result<(), PackageError> {
        self.ensure_writable()?;
        let output_path = output_path.as_ref();
        let directory = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp_file = NamedTempFile::new_in(directory)?;
        let written = {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            let written = self.write_to(&mut writer, options)?;
            writer.flush()?;
            written
        };
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(output_path)
            .map_err(|e| PackageError::IoError(e.error))?;

        tracing::debug!(
            "Saved {} resources to {}",
            written.entries.len(),
            output_path.display()
        );

        self.header = written.header;
        self.index = written.entries.into_iter().collect();
        self.staged.clear();
        self.source = Some(PackageSource::File(output_path.to_path_buf()));
        self.dirty = false;
        Ok(())
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let source = match &self.source {
            None => "none".to_string(),
            Some(PackageSource::File(path)) => path.display().to_string(),
            Some(PackageSource::Memory(data)) => format!("{} bytes in memory", data.len()),
        };
        write!(
            f,
            "{{source: {}, resources: {}, staged: {}, read_only: {}, dirty: {} }}",
            source,
            self.index.active_count(),
            self.staged.len(),
            self.read_only,
            self.dirty
        )
    }
}

/// Reads stored resource bytes, keeping the package file open across reads.
pub(crate) struct BlobReader<'a> {
    package: &'a Package,
    file: Option<(File, u64)>,
}

impl BlobReader<'_> {
    pub(crate) fn stored_bytes(&mut self, entry: &ResourceIndexEntry) -> Result<Vec<u8>, PackageError> {
        if let Some(data) = self.package.staged.get(&entry.key) {
            return Ok(data.clone());
        }

        match &self.package.source {
            None => Err(PackageError::ResourceNotFound(entry.key)),
            Some(PackageSource::Memory(data)) => {
                Package::validate_range(entry, data.len() as u64)?;
                let start = entry.file_offset as usize;
                Ok(data[start..start + entry.stored_size as usize].to_vec())
            }
            Some(PackageSource::File(path)) => {
                if self.file.is_none() {
                    let file = File::open(path)?;
                    let len = file.metadata()?.len();
                    self.file = Some((file, len));
                }
                let Some((file, len)) = self.file.as_mut() else {
                    return Err(PackageError::ResourceNotFound(entry.key));
                };

                Package::validate_range(entry, *len)?;
                file.seek(SeekFrom::Start(entry.file_offset))?;
                let mut buffer = vec![0; entry.stored_size as usize];
                file.read_exact(&mut buffer)?;
                Ok(buffer)
            }
        }
    }
}
