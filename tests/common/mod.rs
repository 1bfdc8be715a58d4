#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

/// Routes library logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds package bytes by hand, including layouts the library itself never writes.
pub struct RawPackage {
    pub minor_version: u32,
    pub index_position_override: Option<u32>,
    pub index_size_override: Option<u32>,
    pub resource_count_override: Option<u32>,
    pub resources: Vec<RawRecord>,
}

pub struct RawRecord {
    pub resource_type: u32,
    pub resource_group: u32,
    pub instance: u64,
    pub data: Vec<u8>,
    pub raw_file_size: Option<u32>,
    pub memory_size: Option<u32>,
    pub flags: u16,
    pub committed: u16,
    pub offset_override: Option<u32>,
}

impl RawRecord {
    pub fn new(resource_type: u32, resource_group: u32, instance: u64, data: &[u8]) -> Self {
        Self {
            resource_type,
            resource_group,
            instance,
            data: data.to_vec(),
            raw_file_size: None,
            memory_size: None,
            flags: 0,
            committed: 1,
            offset_override: None,
        }
    }
}

impl RawPackage {
    pub fn new() -> Self {
        Self {
            minor_version: 1,
            index_position_override: None,
            index_size_override: None,
            resource_count_override: None,
            resources: vec![],
        }
    }

    pub fn with(mut self, record: RawRecord) -> Self {
        self.resources.push(record);
        self
    }

    /// Header, then each resource's data, then the index.
    pub fn build(&self) -> Vec<u8> {
        let mut data_section = vec![];
        let mut offsets = vec![];
        for record in &self.resources {
            offsets.push(96 + data_section.len() as u32);
            data_section.extend_from_slice(&record.data);
        }

        let mut index = vec![];
        for (record, offset) in self.resources.iter().zip(offsets) {
            index.extend_from_slice(&record.resource_type.to_le_bytes());
            index.extend_from_slice(&record.resource_group.to_le_bytes());
            if self.minor_version == 0 {
                index.extend_from_slice(&record.instance.to_le_bytes());
            } else {
                index.extend_from_slice(&((record.instance >> 32) as u32).to_le_bytes());
                index.extend_from_slice(&(record.instance as u32).to_le_bytes());
            }
            index.extend_from_slice(&record.offset_override.unwrap_or(offset).to_le_bytes());
            let size = record.data.len() as u32;
            index.extend_from_slice(&record.raw_file_size.unwrap_or(size).to_le_bytes());
            index.extend_from_slice(&record.memory_size.unwrap_or(size).to_le_bytes());
            index.extend_from_slice(&record.flags.to_le_bytes());
            index.extend_from_slice(&record.committed.to_le_bytes());
        }

        let index_position = 96 + data_section.len() as u32;
        let mut bytes = vec![];
        bytes.extend_from_slice(b"DBPF");
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&self.minor_version.to_le_bytes());
        bytes.extend_from_slice(&[0; 12]);
        bytes.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(
            &self
                .resource_count_override
                .unwrap_or(self.resources.len() as u32)
                .to_le_bytes(),
        );
        bytes.extend_from_slice(
            &self
                .index_position_override
                .unwrap_or(index_position)
                .to_le_bytes(),
        );
        bytes.extend_from_slice(
            &self
                .index_size_override
                .unwrap_or(index.len() as u32)
                .to_le_bytes(),
        );
        bytes.extend_from_slice(&[0; 40]);
        assert_eq!(bytes.len(), 96);

        bytes.extend_from_slice(&data_section);
        bytes.extend_from_slice(&index);
        bytes
    }

    /// Like [RawPackage::build], but with the index directly after the header and the
    /// header's index position left at zero.
    pub fn build_index_first(&self) -> Vec<u8> {
        let index_len = self.resources.len() * 32;
        let mut data_section = vec![];
        let mut index = vec![];
        for record in &self.resources {
            let offset = (96 + index_len + data_section.len()) as u32;
            data_section.extend_from_slice(&record.data);

            index.extend_from_slice(&record.resource_type.to_le_bytes());
            index.extend_from_slice(&record.resource_group.to_le_bytes());
            index.extend_from_slice(&((record.instance >> 32) as u32).to_le_bytes());
            index.extend_from_slice(&(record.instance as u32).to_le_bytes());
            index.extend_from_slice(&offset.to_le_bytes());
            let size = record.data.len() as u32;
            index.extend_from_slice(&size.to_le_bytes());
            index.extend_from_slice(&size.to_le_bytes());
            index.extend_from_slice(&0u16.to_le_bytes());
            index.extend_from_slice(&1u16.to_le_bytes());
        }

        let mut bytes = self.build();
        bytes.truncate(96);
        bytes[48..52].copy_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&index);
        bytes.extend_from_slice(&data_section);
        bytes
    }
}
