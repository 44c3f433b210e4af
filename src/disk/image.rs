use super::{BlockStore, DiskError, FloppyGeometry, CD_SECTOR_SIZE, MAX_DRIVES, SECTOR_SIZE};
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Anything a disk image can live in: a file, or an in-memory cursor.
pub trait ImageBackend: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> ImageBackend for T {}

/// Per-drive facts the controllers need without touching the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveInfo {
    pub sector_size: usize,
    pub num_sectors: u32,
    /// ATAPI (CD) image
    pub is_cd: bool,
    pub floppy_geometry: FloppyGeometry,
}

/// A flat image addressed as fixed-size sectors.
pub struct DiskImage {
    backend: Box<dyn ImageBackend>,
    info: DriveInfo,
    size: u64,
}

impl std::fmt::Debug for DiskImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImage")
            .field("info", &self.info)
            .field("size", &self.size)
            .finish()
    }
}

impl DiskImage {
    /// Open an image file. `.iso` images use 2048-byte sectors.
    ///
    /// Read-only files are still usable; writes to them fail at I/O time.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DiskError> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(_) => File::open(path).map_err(|source| DiskError::Open {
                path: path.to_path_buf(),
                source,
            })?,
        };

        let is_cd = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("iso"));

        let image = Self::from_backend(Box::new(file), is_cd)?;
        if image.size == 0 {
            return Err(DiskError::EmptyImage {
                path: path.to_path_buf(),
            });
        }
        Ok(image)
    }

    /// Wrap an already open backend.
    pub fn from_backend(mut backend: Box<dyn ImageBackend>, is_cd: bool) -> Result<Self, DiskError> {
        let size = backend.seek(SeekFrom::End(0))?;
        let sector_size = if is_cd { CD_SECTOR_SIZE } else { SECTOR_SIZE };
        let num_sectors = (size / sector_size as u64).min(u32::MAX as u64) as u32;

        Ok(Self {
            backend,
            info: DriveInfo {
                sector_size,
                num_sectors,
                is_cd,
                floppy_geometry: FloppyGeometry::guess(size),
            },
            size,
        })
    }

    pub fn info(&self) -> DriveInfo {
        self.info
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn override_sectors_per_track(&mut self, sectors_per_track: u8) {
        self.info.floppy_geometry = self
            .info
            .floppy_geometry
            .with_sectors_per_track(self.size, sectors_per_track);
    }

    fn seek_sector(&mut self, lba: u32, len: usize) -> io::Result<()> {
        if lba >= self.info.num_sectors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("lba {} beyond end of image ({} sectors)", lba, self.info.num_sectors),
            ));
        }
        if len != self.info.sector_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {} bytes for {} byte sectors", len, self.info.sector_size),
            ));
        }
        self.backend
            .seek(SeekFrom::Start(lba as u64 * self.info.sector_size as u64))?;
        Ok(())
    }

    pub fn read_sector(&mut self, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        self.seek_sector(lba, buf.len())?;
        self.backend.read_exact(buf)
    }

    pub fn write_sector(&mut self, lba: u32, buf: &[u8]) -> io::Result<()> {
        self.seek_sector(lba, buf.len())?;
        self.backend.write_all(buf)?;
        self.backend.flush()
    }
}

/// The images attached to one controller, shared with its bridge worker.
///
/// The emulation side only locks this while attaching or detaching images;
/// sector I/O goes through the bridge.
#[derive(Clone, Debug)]
pub struct DiskSet {
    drives: Arc<Mutex<Vec<Option<DiskImage>>>>,
}

impl Default for DiskSet {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> io::Error {
    io::Error::other("disk set lock poisoned")
}

impl DiskSet {
    pub fn new() -> Self {
        Self {
            drives: Arc::new(Mutex::new((0..MAX_DRIVES).map(|_| None).collect())),
        }
    }

    /// Attach `image` to `unit`, replacing whatever was there.
    pub fn attach(&self, unit: u8, image: DiskImage) -> Result<DriveInfo, DiskError> {
        if unit as usize >= MAX_DRIVES {
            return Err(DiskError::InvalidUnit { unit });
        }
        let mut drives = self.drives.lock().map_err(|_| poisoned())?;
        let info = image.info();
        info!(
            "Attached disk unit {}: {} sectors of {} bytes{}",
            unit,
            info.num_sectors,
            info.sector_size,
            if info.is_cd { " (ATAPI)" } else { "" }
        );
        drives[unit as usize] = Some(image);
        Ok(info)
    }

    pub fn open(&self, unit: u8, path: impl AsRef<Path>) -> Result<DriveInfo, DiskError> {
        let image = DiskImage::open(path)?;
        self.attach(unit, image)
    }

    pub fn detach(&self, unit: u8) -> Result<Option<DiskImage>, DiskError> {
        if unit as usize >= MAX_DRIVES {
            return Err(DiskError::InvalidUnit { unit });
        }
        let mut drives = self.drives.lock().map_err(|_| poisoned())?;
        Ok(drives[unit as usize].take())
    }

    pub fn info(&self, unit: u8) -> Option<DriveInfo> {
        let drives = self.drives.lock().ok()?;
        drives.get(unit as usize)?.as_ref().map(DiskImage::info)
    }

    /// Change the floppy sectors per track of an attached image.
    pub fn override_sectors_per_track(
        &self,
        unit: u8,
        sectors_per_track: u8,
    ) -> Result<DriveInfo, DiskError> {
        let mut drives = self.drives.lock().map_err(|_| poisoned())?;
        let image = drives
            .get_mut(unit as usize)
            .and_then(Option::as_mut)
            .ok_or(DiskError::InvalidUnit { unit })?;
        image.override_sectors_per_track(sectors_per_track);
        Ok(image.info())
    }

    fn with_image<R>(
        &self,
        unit: u8,
        f: impl FnOnce(&mut DiskImage) -> io::Result<R>,
    ) -> io::Result<R> {
        let mut drives = self.drives.lock().map_err(|_| poisoned())?;
        match drives.get_mut(unit as usize).and_then(Option::as_mut) {
            Some(image) => f(image),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no image attached to unit {}", unit),
            )),
        }
    }
}

impl BlockStore for DiskSet {
    fn read(&mut self, unit: u8, lba: u32, buf: &mut [u8]) -> io::Result<()> {
        self.with_image(unit, |image| image.read_sector(lba, buf))
            .inspect_err(|e| warn!("Disk read unit {} lba {} failed: {}", unit, lba, e))
    }

    fn write(&mut self, unit: u8, lba: u32, buf: &[u8]) -> io::Result<()> {
        self.with_image(unit, |image| image.write_sector(lba, buf))
            .inspect_err(|e| warn!("Disk write unit {} lba {} failed: {}", unit, lba, e))
    }
}
