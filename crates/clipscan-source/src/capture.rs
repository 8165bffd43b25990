// clipscan-source/src/capture.rs
use crate::{frame_count_or_sentinel, ChannelOrder, RawFrame, Result, SourceError, VideoSource};
use log::{debug, info};
use opencv::{
    core::{Mat, CV_8UC3},
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_COUNT, CAP_PROP_POS_FRAMES},
};
use std::path::{Path, PathBuf};

/// Container clip decoded by OpenCV `videoio`. Frames come out BGR.
pub struct OpencvClip {
    capture: VideoCapture,
    path: PathBuf,
    total_frames: usize,
    open: bool,
}

impl OpencvClip {
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| SourceError::ClipOpen { path: path.to_path_buf(), reason };

        let path_str = path
            .to_str()
            .ok_or_else(|| open_err("path is not valid UTF-8".into()))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY).map_err(|e| open_err(e.to_string()))?;
        if !capture.is_opened().map_err(|e| open_err(e.to_string()))? {
            return Err(open_err("failed to open mp4".into()));
        }

        let raw_count = capture.get(CAP_PROP_FRAME_COUNT).unwrap_or(0.0);
        let total_frames = frame_count_or_sentinel(raw_count);

        info!(
            "OpencvClip: opened {}, stream_frames={}, using={}",
            path.display(),
            raw_count,
            total_frames
        );

        Ok(Self { capture, path: path.to_path_buf(), total_frames, open: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for OpencvClip {
    fn total_frame_count(&self) -> usize {
        self.total_frames
    }

    fn seek_and_read(&mut self, index: usize) -> Result<RawFrame> {
        let decode_err = |reason: String| SourceError::FrameDecode { index, reason };
        if !self.open {
            return Err(decode_err("clip is closed".into()));
        }

        self.capture
            .set(CAP_PROP_POS_FRAMES, index as f64)
            .map_err(|e| decode_err(e.to_string()))?;

        let mut frame = Mat::default();
        let success = self.capture.read(&mut frame).map_err(|e| decode_err(e.to_string()))?;
        if !success || frame.empty() {
            return Err(decode_err("read returned no frame".into()));
        }
        if frame.typ() != CV_8UC3 {
            return Err(decode_err(format!("unexpected Mat type {}", frame.typ())));
        }

        // ROI views and padded rows are not contiguous; copy once to pack them.
        let frame = if frame.is_continuous() {
            frame
        } else {
            frame.try_clone().map_err(|e| decode_err(e.to_string()))?
        };

        let size = frame.size().map_err(|e| decode_err(e.to_string()))?;
        let bytes = frame.data_bytes().map_err(|e| decode_err(e.to_string()))?.to_vec();
        debug!("OpencvClip: frame {} ({}x{})", index, size.width, size.height);

        RawFrame::new(size.width as u32, size.height as u32, ChannelOrder::Bgr, bytes)
    }

    fn close(&mut self) {
        if self.open {
            let _ = self.capture.release();
            self.open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for OpencvClip {
    fn drop(&mut self) {
        self.close();
    }
}
