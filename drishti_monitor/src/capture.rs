use drishti::core_modules::capture::{self, CaptureError, FrameSource, SourceKind};

/// Opens a frame source, using OpenCV for cameras and video files when it is compiled in.
pub fn open_source(kind: &SourceKind) -> Result<Box<dyn FrameSource>, CaptureError> {
    match kind {
        #[cfg(feature = "opencv")]
        SourceKind::Camera { .. } | SourceKind::VideoFile(_) => {
            Ok(Box::new(opencv_source::OpenCvSource::open(kind)?))
        }
        _ => capture::acquire(kind),
    }
}

#[cfg(feature = "opencv")]
mod opencv_source {
    use drishti::core_modules::capture::{CaptureError, Frame, FrameSource, SourceKind};
    use image::RgbImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use std::sync::Arc;

    const CAMERA_WIDTH: f64 = 640.0;
    const CAMERA_HEIGHT: f64 = 480.0;

    fn read_err(e: opencv::Error) -> CaptureError {
        CaptureError::Read(e.to_string())
    }

    pub struct OpenCvSource {
        cap: VideoCapture,
        label: String,
        /// The most recent decoded frame. Served again once a video runs out.
        last: Option<Arc<RgbImage>>,
        next_sequence: u64,
    }

    impl OpenCvSource {
        pub fn open(kind: &SourceKind) -> Result<Self, CaptureError> {
            let unavailable = |e: opencv::Error| CaptureError::unavailable(kind, e.to_string());
            let cap = match kind {
                SourceKind::Camera { index } => {
                    let mut cap = VideoCapture::new(*index, videoio::CAP_ANY).map_err(unavailable)?;
                    // Resolution is a hint; drivers may ignore it.
                    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, CAMERA_WIDTH);
                    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, CAMERA_HEIGHT);
                    cap
                }
                SourceKind::VideoFile(path) => {
                    VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
                        .map_err(unavailable)?
                }
                _ => return Err(CaptureError::unavailable(kind, "not an OpenCV source")),
            };
            if !cap.is_opened().map_err(unavailable)? {
                return Err(CaptureError::unavailable(kind, "device or file could not be opened"));
            }
            Ok(Self {
                cap,
                label: kind.to_string(),
                last: None,
                next_sequence: 0,
            })
        }

        fn emit(&mut self, image: Arc<RgbImage>) -> Frame {
            let frame = Frame::new(image, self.next_sequence);
            self.next_sequence += 1;
            frame
        }
    }

    impl FrameSource for OpenCvSource {
        fn grab(&mut self) -> Result<Frame, CaptureError> {
            let mut bgr = Mat::default();
            let read = self.cap.read(&mut bgr).map_err(read_err)?;
            if !read || bgr.empty() {
                // End of video: keep showing the final frame.
                return match self.last.clone() {
                    Some(last) => Ok(self.emit(last)),
                    None => Err(CaptureError::Read("no frame decoded yet".to_string())),
                };
            }

            // OpenCV hands out BGR; the engine works in RGB.
            let mut rgb = Mat::default();
            imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(read_err)?;
            let width = rgb.cols() as u32;
            let height = rgb.rows() as u32;
            let bytes = rgb.data_bytes().map_err(read_err)?.to_vec();
            let image = RgbImage::from_raw(width, height, bytes)
                .ok_or_else(|| CaptureError::Read("frame buffer does not match its size".to_string()))?;

            let image = Arc::new(image);
            self.last = Some(Arc::clone(&image));
            Ok(self.emit(image))
        }

        fn describe(&self) -> String {
            self.label.clone()
        }
    }
}
