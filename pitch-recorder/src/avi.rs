//! Hand-rolled RIFF/AVI MJPEG muxer.
//!
//! Shaped the same way `fmf::FMFWriter` is: an incremental `Write + Seek`
//! writer that emits a header up front with a few fields it cannot yet know
//! (frame count, chunk sizes), writes frames as they arrive, then seeks back
//! and patches those fields on close. AVI/MJPEG stands in for FMF's flat
//! fixed-record format because the pitch recorder's clips need to be
//! playable in an ordinary video player; the JPEG payloads themselves come
//! from the `image` crate's encoder.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};

use crate::error::Result;

const FOURCC_MJPG: u32 = 0x47_50_4A_4D; // "MJPG" little-endian as u32
const AVIIF_KEYFRAME: u32 = 0x10;

struct IndexEntry {
    offset_from_movi_data: u32,
    size: u32,
}

/// Incrementally writes one MJPEG-in-AVI clip.
pub struct AviWriter<F: Write + Seek> {
    f: Option<F>,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u32,
    index: Vec<IndexEntry>,
    movi_data_start: u64,
    riff_size_pos: u64,
    movi_list_size_pos: u64,
    avih_total_frames_pos: u64,
    strh_length_pos: u64,
    closed: bool,
}

impl<F: Write + Seek> AviWriter<F> {
    pub fn new(mut f: F, width: u32, height: u32, fps: f64) -> Result<Self> {
        // RIFF header; size patched on close.
        f.write_all(b"RIFF")?;
        let riff_size_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?;
        f.write_all(b"AVI ")?;

        // hdrl list.
        f.write_all(b"LIST")?;
        let hdrl_size_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?;
        let hdrl_start = f.stream_position()?;
        f.write_all(b"hdrl")?;

        // avih (AVIMAINHEADER, 56 bytes).
        f.write_all(b"avih")?;
        f.write_u32::<LittleEndian>(56)?;
        let micro_sec_per_frame = (1_000_000.0 / fps).round() as u32;
        f.write_u32::<LittleEndian>(micro_sec_per_frame)?;
        f.write_u32::<LittleEndian>(0)?; // dwMaxBytesPerSec
        f.write_u32::<LittleEndian>(0)?; // dwPaddingGranularity
        f.write_u32::<LittleEndian>(0x10)?; // dwFlags = AVIF_HASINDEX
        let avih_total_frames_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?; // dwTotalFrames, patched on close
        f.write_u32::<LittleEndian>(0)?; // dwInitialFrames
        f.write_u32::<LittleEndian>(1)?; // dwStreams
        f.write_u32::<LittleEndian>(width * height * 3)?; // dwSuggestedBufferSize
        f.write_u32::<LittleEndian>(width)?;
        f.write_u32::<LittleEndian>(height)?;
        for _ in 0..4 {
            f.write_u32::<LittleEndian>(0)?; // dwReserved[4]
        }

        // strl list.
        f.write_all(b"LIST")?;
        let strl_size_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?;
        let strl_start = f.stream_position()?;
        f.write_all(b"strl")?;

        // strh (AVISTREAMHEADER, 56 bytes).
        f.write_all(b"strh")?;
        f.write_u32::<LittleEndian>(56)?;
        f.write_all(b"vids")?;
        f.write_u32::<LittleEndian>(FOURCC_MJPG)?;
        f.write_u32::<LittleEndian>(0)?; // dwFlags
        f.write_u16::<LittleEndian>(0)?; // wPriority
        f.write_u16::<LittleEndian>(0)?; // wLanguage
        f.write_u32::<LittleEndian>(0)?; // dwInitialFrames
        f.write_u32::<LittleEndian>(1)?; // dwScale
        f.write_u32::<LittleEndian>(fps.round() as u32)?; // dwRate
        f.write_u32::<LittleEndian>(0)?; // dwStart
        let strh_length_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?; // dwLength, patched on close
        f.write_u32::<LittleEndian>(width * height * 3)?; // dwSuggestedBufferSize
        f.write_u32::<LittleEndian>(0xFFFF_FFFF)?; // dwQuality
        f.write_u32::<LittleEndian>(0)?; // dwSampleSize
        f.write_i16::<LittleEndian>(0)?; // rcFrame.left
        f.write_i16::<LittleEndian>(0)?; // rcFrame.top
        f.write_i16::<LittleEndian>(width as i16)?; // rcFrame.right
        f.write_i16::<LittleEndian>(height as i16)?; // rcFrame.bottom

        // strf (BITMAPINFOHEADER, 40 bytes).
        f.write_all(b"strf")?;
        f.write_u32::<LittleEndian>(40)?;
        f.write_u32::<LittleEndian>(40)?; // biSize
        f.write_i32::<LittleEndian>(width as i32)?;
        f.write_i32::<LittleEndian>(height as i32)?;
        f.write_u16::<LittleEndian>(1)?; // biPlanes
        f.write_u16::<LittleEndian>(24)?; // biBitCount
        f.write_u32::<LittleEndian>(FOURCC_MJPG)?; // biCompression
        f.write_u32::<LittleEndian>(width * height * 3)?; // biSizeImage
        f.write_i32::<LittleEndian>(0)?; // biXPelsPerMeter
        f.write_i32::<LittleEndian>(0)?; // biYPelsPerMeter
        f.write_u32::<LittleEndian>(0)?; // biClrUsed
        f.write_u32::<LittleEndian>(0)?; // biClrImportant

        patch_list_size(&mut f, strl_size_pos, strl_start)?;
        patch_list_size(&mut f, hdrl_size_pos, hdrl_start)?;

        // movi list; size patched on close, data start recorded for idx1 offsets.
        f.write_all(b"LIST")?;
        let movi_list_size_pos = f.stream_position()?;
        f.write_u32::<LittleEndian>(0)?;
        let movi_data_start = f.stream_position()?;
        f.write_all(b"movi")?;

        Ok(Self {
            f: Some(f),
            width,
            height,
            fps,
            frame_count: 0,
            index: Vec::new(),
            movi_data_start,
            riff_size_pos,
            movi_list_size_pos,
            avih_total_frames_pos,
            strh_length_pos,
            closed: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Appends one already-encoded JPEG frame as a `00dc` chunk.
    pub fn write_jpeg_frame(&mut self, jpeg_bytes: &[u8]) -> Result<()> {
        let f = self.f.as_mut().expect("AviWriter used after close");
        let chunk_start = f.stream_position()?;
        f.write_all(b"00dc")?;
        f.write_u32::<LittleEndian>(jpeg_bytes.len() as u32)?;
        f.write_all(jpeg_bytes)?;
        if jpeg_bytes.len() % 2 == 1 {
            f.write_u8(0)?;
        }
        self.index.push(IndexEntry {
            offset_from_movi_data: (chunk_start - self.movi_data_start) as u32,
            size: jpeg_bytes.len() as u32,
        });
        self.frame_count += 1;
        Ok(())
    }

    /// Writes the `idx1` index and patches the header sizes/frame counts.
    /// Mirrors `FMFWriter::close`: seek back to known offsets and overwrite
    /// the placeholders written at `new`.
    pub fn close(mut self) -> Result<F> {
        self.finish()?;
        Ok(self.f.take().expect("AviWriter used after close"))
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let f = self.f.as_mut().expect("AviWriter used after close");

        let movi_end = f.stream_position()?;
        let movi_list_size = (movi_end - self.movi_data_start + 4) as u32; // + "movi" fourcc
        patch_u32(f, self.movi_list_size_pos, movi_list_size)?;

        f.write_all(b"idx1")?;
        let idx1_size = (self.index.len() * 16) as u32;
        f.write_u32::<LittleEndian>(idx1_size)?;
        for entry in &self.index {
            f.write_all(b"00dc")?;
            f.write_u32::<LittleEndian>(AVIIF_KEYFRAME)?;
            f.write_u32::<LittleEndian>(entry.offset_from_movi_data)?;
            f.write_u32::<LittleEndian>(entry.size)?;
        }

        patch_u32(f, self.avih_total_frames_pos, self.frame_count)?;
        patch_u32(f, self.strh_length_pos, self.frame_count)?;

        let file_end = f.stream_position()?;
        patch_u32(f, self.riff_size_pos, (file_end - 8) as u32)?;
        f.flush()?;
        Ok(())
    }
}

impl<F: Write + Seek> Drop for AviWriter<F> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn patch_list_size<F: Write + Seek>(f: &mut F, size_pos: u64, data_start: u64) -> Result<()> {
    let end = f.stream_position()?;
    let size = (end - data_start) as u32;
    patch_u32(f, size_pos, size)
}

fn patch_u32<F: Write + Seek>(f: &mut F, pos: u64, value: u32) -> Result<()> {
    let back_to = f.stream_position()?;
    f.seek(SeekFrom::Start(pos))?;
    f.write_u32::<LittleEndian>(value)?;
    f.seek(SeekFrom::Start(back_to))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_and_frame_counts_are_patched_on_close() {
        let buf = Cursor::new(Vec::new());
        let mut writer = AviWriter::new(buf, 8, 8, 30.0).unwrap();
        writer.write_jpeg_frame(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        writer.write_jpeg_frame(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]).unwrap();
        let buf = writer.close().unwrap();
        let bytes = buf.into_inner();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size as usize, bytes.len() - 8);

        // dwTotalFrames lives 8 bytes into the avih payload (after
        // dwMicroSecPerFrame/dwMaxBytesPerSec/dwPaddingGranularity/dwFlags).
        let avih_pos = bytes
            .windows(4)
            .position(|w| w == b"avih")
            .expect("avih chunk present");
        let total_frames_pos = avih_pos + 8 + 16;
        let total_frames =
            u32::from_le_bytes(bytes[total_frames_pos..total_frames_pos + 4].try_into().unwrap());
        assert_eq!(total_frames, 2);

        assert!(bytes.windows(4).any(|w| w == b"idx1"));
        assert!(bytes.windows(4).any(|w| w == b"00dc"));
    }

    #[test]
    fn odd_length_payload_is_padded_to_even() {
        let buf = Cursor::new(Vec::new());
        let mut writer = AviWriter::new(buf, 4, 4, 30.0).unwrap();
        writer.write_jpeg_frame(&[1, 2, 3]).unwrap(); // odd length
        let buf = writer.close().unwrap();
        let bytes = buf.into_inner();
        let chunk_pos = bytes.windows(4).position(|w| w == b"00dc").unwrap();
        let size = u32::from_le_bytes(
            bytes[chunk_pos + 4..chunk_pos + 8]
                .try_into()
                .unwrap(),
        );
        assert_eq!(size, 3);
        // one pad byte follows the 3 payload bytes before the next chunk/idx1.
        let next = &bytes[chunk_pos + 8 + 3..chunk_pos + 8 + 4];
        assert_eq!(next.len(), 1);
    }
}
