use std::fmt;

use binrw::{binrw, BinRead, BinResult, BinWrite};
use bitfield_struct::bitfield;

use crate::resource::resource_key::ResourceKey;

/// How the 64-bit instance is laid out inside an index record.
/// Chosen by the package header's minor version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstanceLayout {
    /// One little-endian u64.
    Native64,
    /// Two little-endian u32 words, high word first.
    SplitHighLow,
}

impl InstanceLayout {
    pub fn for_minor_version(minor_version: u32) -> Self {
        match minor_version {
            0 => InstanceLayout::Native64,
            _ => InstanceLayout::SplitHighLow,
        }
    }
}

/// The on-disk file-size word: the low 31 bits hold the stored size,
/// the high bit flags the payload as compressed.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct FileSizeField {
    #[bits(31)]
    pub size: u32,
    pub compressed: bool,
}

impl FileSizeField {
    pub const MAX_SIZE: u32 = 0x7FFF_FFFF;
}

/// Location and shape of a single resource inside a package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceIndexEntry {
    pub key: ResourceKey,
    pub file_offset: u64,
    /// Bytes occupied in the file, after compression if the resource is compressed.
    pub stored_size: u32,
    /// Logical size once decompressed.
    pub memory_size: u32,
    pub is_compressed: bool,
    pub is_deleted: bool,
    /// Raw record flags. For compressed resources this is the tag of the codec that compressed them.
    pub flags: u16,
    pub committed: u16,
}

impl ResourceIndexEntry {
    pub fn new(key: ResourceKey, file_offset: u64, stored_size: u32, memory_size: u32) -> Self {
        Self {
            key,
            file_offset,
            stored_size,
            memory_size,
            is_compressed: false,
            is_deleted: false,
            flags: 0,
            committed: 1,
        }
    }

    pub fn compressed(mut self, is_compressed: bool) -> Self {
        self.is_compressed = is_compressed;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    /// One past the last stored byte, or `None` if it does not fit in a u64.
    pub fn end_offset(&self) -> Option<u64> {
        self.file_offset.checked_add(u64::from(self.stored_size))
    }
}

impl fmt::Display for ResourceIndexEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "resource {} is {} bytes at {} ({} in memory{}{})",
            self.key.to_hex_string(),
            self.stored_size,
            self.file_offset,
            self.memory_size,
            if self.is_compressed { ", compressed" } else { "" },
            if self.is_deleted { ", deleted" } else { "" },
        )
    }
}

/// One fixed-size record of the package index table.
#[binrw]
#[brw(little, import(layout: InstanceLayout))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRecord {
    pub resource_type: u32,
    pub resource_group: u32,

    #[br(parse_with = read_instance, args(layout))]
    #[bw(write_with = write_instance, args(layout))]
    pub instance: u64,

    pub file_offset: u32,

    #[br(map = FileSizeField::from_bits)]
    #[bw(map = |field: &FileSizeField| field.into_bits())]
    pub file_size: FileSizeField,

    pub memory_size: u32,
    pub flags: u16,
    pub committed: u16,
}

impl IndexRecord {
    pub const SIZE: u64 = 32;
    pub const FLAGS_DELETED: u16 = 0xFFE0;

    pub fn to_entry(&self) -> ResourceIndexEntry {
        ResourceIndexEntry {
            key: ResourceKey::new(self.resource_type, self.resource_group, self.instance),
            file_offset: u64::from(self.file_offset),
            stored_size: self.file_size.size(),
            memory_size: self.memory_size,
            is_compressed: self.file_size.compressed(),
            is_deleted: self.flags == Self::FLAGS_DELETED,
            flags: self.flags,
            committed: self.committed,
        }
    }

    /// Builds the record for a resource written at `file_offset`.
    ///
    /// The caller guarantees `stored_size` fits in 31 bits.
    pub fn from_entry(entry: &ResourceIndexEntry, file_offset: u32) -> Self {
        Self {
            resource_type: entry.key.resource_type,
            resource_group: entry.key.resource_group,
            instance: entry.key.instance,
            file_offset,
            file_size: FileSizeField::new()
                .with_size(entry.stored_size & FileSizeField::MAX_SIZE)
                .with_compressed(entry.is_compressed),
            memory_size: entry.memory_size,
            flags: if entry.is_deleted {
                Self::FLAGS_DELETED
            } else {
                entry.flags
            },
            committed: entry.committed,
        }
    }
}

#[binrw::parser(reader, endian)]
fn read_instance(layout: InstanceLayout) -> BinResult<u64> {
    match layout {
        InstanceLayout::Native64 => u64::read_options(reader, endian, ()),
        InstanceLayout::SplitHighLow => {
            let high = u32::read_options(reader, endian, ())?;
            let low = u32::read_options(reader, endian, ())?;
            Ok((u64::from(high) << 32) | u64::from(low))
        }
    }
}

#[binrw::writer(writer, endian)]
fn write_instance(instance: &u64, layout: InstanceLayout) -> BinResult<()> {
    match layout {
        InstanceLayout::Native64 => instance.write_options(writer, endian, ()),
        InstanceLayout::SplitHighLow => {
            ((*instance >> 32) as u32).write_options(writer, endian, ())?;
            (*instance as u32).write_options(writer, endian, ())
        }
    }
}
