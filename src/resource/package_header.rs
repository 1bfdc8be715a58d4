use std::fmt;

use binrw::binrw;

use crate::resource::index_entry::{IndexRecord, InstanceLayout};

/// The fixed 96-byte header at the start of every package.
#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageHeader {
    pub magic: [u8; 4],
    pub major_version: u32,
    pub minor_version: u32,
    pub reserved_0: [u8; 12],
    pub created_at: u64,
    pub modified_at: u64,
    pub index_major_version: u32,
    pub resource_count: u32,
    /// Offset of the index table. Zero means the table directly follows the header.
    pub index_position: u32,
    pub index_size: u32,
    pub reserved_1: [u8; 40],
}

impl PackageHeader {
    pub const MAGIC: [u8; 4] = *b"DBPF";
    pub const SIZE: u64 = 96;

    pub const DEFAULT_MAJOR_VERSION: u32 = 2;
    pub const DEFAULT_MINOR_VERSION: u32 = 1;
    pub const DEFAULT_INDEX_MAJOR_VERSION: u32 = 3;

    /// A header describing an empty package.
    pub fn new(created_at: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            major_version: Self::DEFAULT_MAJOR_VERSION,
            minor_version: Self::DEFAULT_MINOR_VERSION,
            reserved_0: [0; 12],
            created_at,
            modified_at: created_at,
            index_major_version: Self::DEFAULT_INDEX_MAJOR_VERSION,
            resource_count: 0,
            index_position: 0,
            index_size: 0,
            reserved_1: [0; 40],
        }
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn instance_layout(&self) -> InstanceLayout {
        InstanceLayout::for_minor_version(self.minor_version)
    }

    /// Whether the header announces an index table that needs to be read.
    pub fn has_index(&self) -> bool {
        self.index_size != 0 && self.resource_count != 0
    }

    /// Where the index table starts, resolving the zero shorthand.
    pub fn resolved_index_position(&self) -> u64 {
        match self.index_position {
            0 => Self::SIZE,
            position => u64::from(position),
        }
    }

    /// Byte length of the table holding `resource_count` records.
    pub fn expected_index_size(&self) -> u64 {
        u64::from(self.resource_count) * IndexRecord::SIZE
    }
}

impl fmt::Display for PackageHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} v{}.{}, index v{}: {} resources, index of {} bytes at {}",
            String::from_utf8_lossy(&self.magic),
            self.major_version,
            self.minor_version,
            self.index_major_version,
            self.resource_count,
            self.index_size,
            self.resolved_index_position(),
        )
    }
}
