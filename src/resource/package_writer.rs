use std::io::{self, Seek, Write};

use binrw::meta::WriteEndian;
use binrw::BinWrite;

use crate::resource::index_entry::{IndexRecord, ResourceIndexEntry};
use crate::resource::package::{check_cancelled, Package, PackageError, SaveOptions};
use crate::resource::package_header::PackageHeader;
use crate::utils;

/// What a save produced: the final header and the live entries at their new offsets.
#[derive(Clone, Debug)]
pub struct WrittenPackage {
    pub header: PackageHeader,
    pub entries: Vec<ResourceIndexEntry>,
}

/// Serializes a [Package] as header, resource data, index table.
///
/// The header is written as a placeholder first and patched once the index position is known.
pub(crate) struct PackageWriter<'a> {
    package: &'a Package,
    options: &'a SaveOptions,
}

impl<'a> PackageWriter<'a> {
    pub(crate) fn new(package: &'a Package, options: &'a SaveOptions) -> Self {
        Self { package, options }
    }

    /// Patches data at a given offset and seeks back to the current position.
    fn backpatch<W: Write + Seek, T: BinWrite + WriteEndian>(
        writer: &mut W,
        patch_offset: u64,
        data: &T,
    ) -> Result<(), PackageError>
    where
        for<'b> T::Args<'b>: binrw::__private::Required,
    {
        let current_offset = writer.stream_position()?;
        writer.seek(io::SeekFrom::Start(patch_offset))?;
        data.write(writer)?;
        writer.seek(io::SeekFrom::Start(current_offset))?;
        Ok(())
    }

    fn relative_offset<W: Seek>(writer: &mut W, start: u64) -> Result<u32, PackageError> {
        let offset = writer.stream_position()? - start;
        u32::try_from(offset).map_err(|_| PackageError::PackageTooLarge)
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<WrittenPackage, PackageError> {
        let start = writer.stream_position()?;
        let cancellation = self.options.cancellation.as_ref();

        // Placeholder header, patched at the end.
        let mut header = self.package.header().clone();
        header.magic = PackageHeader::MAGIC;
        header.resource_count = 0;
        header.index_position = 0;
        header.index_size = 0;
        header.write(writer)?;

        let mut written = Vec::with_capacity(self.package.resource_count());
        let mut blobs = self.package.blob_reader();

        for entry in self.package.index().iter_active() {
            check_cancelled(cancellation)?;

            let data = blobs.stored_bytes(entry)?;
            let file_offset = Self::relative_offset(writer, start)?;
            writer.write_all(&data)?;

            written.push(ResourceIndexEntry {
                file_offset: u64::from(file_offset),
                stored_size: data.len() as u32,
                ..entry.clone()
            });
        }

        let index_position = Self::relative_offset(writer, start)?;
        let layout = header.instance_layout();

        for entry in &written {
            IndexRecord::from_entry(entry, entry.file_offset as u32)
                .write_le_args(writer, (layout,))?;
        }

        let index_end = Self::relative_offset(writer, start)?;
        check_cancelled(cancellation)?;

        // Now that the index is written, patch the header.
        header.resource_count =
            u32::try_from(written.len()).map_err(|_| PackageError::TooManyResources)?;
        header.index_position = index_position;
        header.index_size = index_end - index_position;
        header.modified_at = self
            .options
            .timestamp
            .unwrap_or_else(utils::unix_timestamp);
        Self::backpatch(writer, start, &header)?;

        tracing::trace!(
            "Wrote {} resources, index of {} bytes at {}",
            header.resource_count,
            header.index_size,
            header.index_position
        );

        Ok(WrittenPackage {
            header,
            entries: written,
        })
    }
}
