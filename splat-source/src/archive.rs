use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use zip::ZipArchive;
use zip::result::ZipError;
use crate::SplatSourceError;
use crate::error::Result;

#[derive(Clone)]
struct ZipData {
    data: Arc<Vec<u8>>,
}

impl AsRef<[u8]> for ZipData {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// An in-memory archive of named arrays (an `.npz` container).
#[derive(Clone)]
pub struct Archive {
    zip: ZipArchive<Cursor<ZipData>>,
}

impl Archive {
    pub async fn open(path: impl AsRef<Path>) -> Result<Archive> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        Self::from_reader(file).await
    }

    pub async fn from_reader(reader: impl AsyncRead + Unpin) -> Result<Archive> {
        let mut data = BufReader::new(reader);
        let peek = read_at_most(&mut data, 64).await?;
        let mut reader = Box::new(AsyncReadExt::chain(Cursor::new(peek.clone()), data));

        if peek.starts_with(b"PK") {
            let mut bytes = vec![];
            reader.read_to_end(&mut bytes).await?;
            Self::from_bytes(bytes)
        } else {
            Err(SplatSourceError::UnknownSource)
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Archive> {
        if !bytes.starts_with(b"PK") {
            return Err(SplatSourceError::UnknownSource);
        }
        let zip = ZipArchive::new(Cursor::new(ZipData {
            data: Arc::new(bytes),
        }))?;
        Ok(Self { zip })
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.zip.file_names()
    }

    /// Bytes of one named array. Numpy stores array `name` as `name.npy`;
    /// both spellings resolve.
    pub fn entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut zip = self.zip.clone();
        for candidate in [format!("{name}.npy"), name.to_string()] {
            match zip.by_name(&candidate) {
                Ok(mut file) => {
                    let mut buffer = vec![];
                    file.read_to_end(&mut buffer)?;
                    return Ok(Some(buffer));
                }
                Err(ZipError::FileNotFound) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }
}

async fn read_at_most<R: AsyncRead + Unpin>(reader: &mut R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer = vec![0; limit];
    let bytes_read = reader.read(&mut buffer).await?;
    buffer.truncate(bytes_read);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use zip::CompressionMethod;
    use zip::write::{SimpleFileOptions, ZipWriter};
    use super::*;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_entry_lookup() {
        let bytes = zip_bytes(&[("means3D.npy", b"abc"), ("raw", b"xyz")]);
        let archive = Archive::from_bytes(bytes).unwrap();

        assert_eq!(archive.entry("means3D").unwrap().unwrap(), b"abc");
        assert_eq!(archive.entry("raw").unwrap().unwrap(), b"xyz");
        assert!(archive.entry("missing").unwrap().is_none());
        assert_eq!(archive.entry_names().count(), 2);
    }

    #[test]
    fn test_rejects_non_zip_payload() {
        let result = Archive::from_bytes(b"ply\nformat ascii 1.0\n".to_vec());
        assert!(matches!(result, Err(SplatSourceError::UnknownSource)));
    }

    #[tokio::test]
    async fn test_from_reader_sniffs_magic() {
        let bytes = zip_bytes(&[("log_scales.npy", b"data")]);
        let archive = Archive::from_reader(Cursor::new(bytes)).await.unwrap();
        assert!(archive.entry("log_scales").unwrap().is_some());

        let result = Archive::from_reader(Cursor::new(b"not an archive".to_vec())).await;
        assert!(matches!(result, Err(SplatSourceError::UnknownSource)));
    }
}
