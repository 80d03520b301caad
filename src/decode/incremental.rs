use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::decode::compose::{Compositor, blend_start_index};
use crate::decode::properties::{FrameProperties, ImageProperties};
use crate::foundation::core::{AnimatedImageMeta, CanvasSize, FrameBitmap, FrameMeta};
use crate::foundation::error::{LoopframeError, LoopframeResult};
use crate::source::{
    ContainerScan, FrameRecord, FrameSource, ImageType, detect_image_type, source_for,
};

/// Why [`IncrementalDecoder::try_decode_frame`] produced no bitmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameUnavailable {
    /// The frame's bytes have not fully arrived yet (or the index is beyond the known frames).
    Incomplete,
    /// The frame, or a frame it composites on top of, failed to decode.
    Corrupt,
}

struct DecodeState {
    data: Arc<Vec<u8>>,
    image_type: ImageType,
    source: Option<Arc<dyn FrameSource>>,
    records: Arc<Vec<FrameRecord>>,
    meta: AnimatedImageMeta,
    generation: u64,
    /// Index of a trailing frame whose bytes were cut short when the buffer was finalized.
    truncated: Option<usize>,
}

impl DecodeState {
    /// Turn a fatal error into the terminal zero-frame state and hand it back to the caller.
    fn poison(&mut self, err: LoopframeError) -> LoopframeError {
        tracing::warn!(error = %err, "image unusable, dropping all frames");
        self.records = Arc::new(Vec::new());
        self.truncated = None;
        self.meta.frame_count = 0;
        self.meta.finalized = true;
        err
    }

    fn apply_scan(&mut self, scan: ContainerScan, is_final: bool) -> LoopframeResult<()> {
        if let Some(header) = scan.header {
            self.meta.canvas_width = header.canvas.width;
            self.meta.canvas_height = header.canvas.height;
            self.meta.loop_count = header.loop_count;
        }

        let mut frames = scan.frames;
        if is_final {
            if scan.header.is_none() {
                return Err(self.poison(LoopframeError::container_corrupt(
                    "buffer finalized before the container header was complete",
                )));
            }
            if let Some(partial) = scan.partial
                && partial.index == frames.len()
            {
                self.truncated = Some(partial.index);
                frames.push(partial);
            }
            if frames.is_empty() {
                return Err(self.poison(LoopframeError::container_corrupt(
                    "container holds no frames",
                )));
            }
        }

        // Frames already exposed never disappear while streaming.
        if frames.len() >= self.records.len() {
            self.records = Arc::new(frames);
        }
        self.meta.frame_count = self.records.len();
        self.meta.finalized = is_final;
        Ok(())
    }
}

/// Owns the append-only compressed buffer of one image and turns it into composited frames.
///
/// Metadata grows as bytes arrive through [`IncrementalDecoder::update_data`]; once the buffer is
/// finalized it is frozen. Decoding replays disposal and blending in frame order on a cached
/// canvas, so sequential access (the playback pattern) costs one frame decode per step.
///
/// All methods take `&self`: ingestion and decoding may run on different threads. A decode only
/// sees frames whose bytes were complete when it started, and works on a shared snapshot of the
/// buffer, so appends never wait for a decode.
pub struct IncrementalDecoder {
    state: RwLock<DecodeState>,
    compositor: Mutex<Option<Compositor>>,
}

impl std::fmt::Debug for IncrementalDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.read();
        f.debug_struct("IncrementalDecoder")
            .field("image_type", &st.image_type)
            .field("meta", &st.meta)
            .field("buffered_bytes", &st.data.len())
            .finish_non_exhaustive()
    }
}

impl IncrementalDecoder {
    /// Empty decoder; the format is detected from the first bytes.
    pub fn new(scale: f64) -> Self {
        Self::build(None, ImageType::Unknown, scale)
    }

    /// Decoder bound to an explicit frame source, skipping format detection.
    pub fn with_source(source: Arc<dyn FrameSource>, scale: f64) -> Self {
        let ty = source.image_type();
        Self::build(Some(source), ty, scale)
    }

    /// Decoder over a complete buffer.
    pub fn from_bytes(bytes: &[u8], scale: f64) -> LoopframeResult<Self> {
        let dec = Self::new(scale);
        dec.update_data(bytes, true)?;
        Ok(dec)
    }

    fn build(source: Option<Arc<dyn FrameSource>>, image_type: ImageType, scale: f64) -> Self {
        Self {
            state: RwLock::new(DecodeState {
                data: Arc::new(Vec::new()),
                image_type,
                source,
                records: Arc::new(Vec::new()),
                meta: AnimatedImageMeta::empty(scale),
                generation: 0,
                truncated: None,
            }),
            compositor: Mutex::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, DecodeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DecodeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_compositor(&self) -> MutexGuard<'_, Option<Compositor>> {
        self.compositor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes and rescan the container as far as the buffer allows.
    ///
    /// Running out of bytes is not an error. Structurally invalid data returns
    /// [`LoopframeError::ContainerCorrupt`] (or [`LoopframeError::Unsupported`] for
    /// unrecognized formats) exactly once; the image then reports zero frames and further updates
    /// fail with [`LoopframeError::Finalized`], as do updates after `is_final`.
    ///
    /// Appending while a decode holds a snapshot copies the buffer once before extending it, so
    /// streaming a large file in small chunks during playback is quadratic in its size. Feed
    /// chunks of a few kilobytes or more.
    #[tracing::instrument(level = "debug", skip(self, bytes), fields(len = bytes.len()))]
    pub fn update_data(&self, bytes: &[u8], is_final: bool) -> LoopframeResult<()> {
        let mut st = self.write();
        if st.meta.finalized {
            return Err(LoopframeError::Finalized);
        }

        Arc::make_mut(&mut st.data).extend_from_slice(bytes);
        st.generation = st.generation.wrapping_add(1);

        if st.source.is_none() {
            let ty = detect_image_type(&st.data);
            if ty == ImageType::Unknown && !is_final {
                return Ok(());
            }
            match source_for(ty) {
                Ok(source) => {
                    tracing::debug!(image_type = ?ty, "detected image type");
                    st.image_type = ty;
                    st.source = Some(Arc::from(source));
                }
                Err(e) => return Err(st.poison(e)),
            }
        }

        let Some(source) = st.source.clone() else {
            return Ok(());
        };
        let scan = match source.parse_container(&st.data, is_final) {
            Ok(scan) => scan,
            Err(e) => return Err(st.poison(e)),
        };
        st.apply_scan(scan, is_final)?;
        tracing::trace!(
            frames = st.meta.frame_count,
            finalized = st.meta.finalized,
            generation = st.generation,
            "container rescanned"
        );
        Ok(())
    }

    /// Change the display scale reported in the metadata.
    pub fn set_scale(&self, scale: f64) {
        self.write().meta.scale = scale;
    }

    /// Snapshot of the container-level metadata.
    pub fn meta(&self) -> AnimatedImageMeta {
        self.read().meta
    }

    /// Number of frames currently exposed.
    pub fn frame_count(&self) -> usize {
        self.read().meta.frame_count
    }

    /// Whether no more bytes will be accepted.
    pub fn is_finalized(&self) -> bool {
        self.read().meta.finalized
    }

    /// Detected (or source-provided) format.
    pub fn image_type(&self) -> ImageType {
        self.read().image_type
    }

    /// Counter bumped by every accepted [`IncrementalDecoder::update_data`] call.
    pub fn data_generation(&self) -> u64 {
        self.read().generation
    }

    /// Compressed bytes received so far.
    pub fn buffered_len(&self) -> usize {
        self.read().data.len()
    }

    /// Metadata of frame `index`, `None` when not (yet) available.
    pub fn frame_meta(&self, index: usize) -> Option<FrameMeta> {
        self.read().records.get(index).map(FrameRecord::meta)
    }

    /// Display duration of frame `index` in seconds.
    pub fn frame_duration(&self, index: usize) -> Option<f64> {
        self.read().records.get(index).map(|r| r.duration)
    }

    /// Frame metadata plus buffer details used by re-encoders.
    pub fn frame_properties(&self, index: usize) -> Option<FrameProperties> {
        let st = self.read();
        st.records
            .get(index)
            .map(|r| FrameProperties::from_record(r, st.truncated == Some(index)))
    }

    /// Serializable summary of the whole image as currently known.
    pub fn image_properties(&self) -> ImageProperties {
        let st = self.read();
        ImageProperties {
            image_type: st.image_type,
            canvas: st.meta.canvas(),
            frame_count: st.meta.frame_count,
            loop_count: st.meta.loop_count,
            scale: st.meta.scale,
            finalized: st.meta.finalized,
            frames: st
                .records
                .iter()
                .map(|r| FrameProperties::from_record(r, st.truncated == Some(r.index)))
                .collect(),
        }
    }

    /// Composited canvas for frame `index`, or `None` if it is unavailable for any reason.
    ///
    /// `for_display` yields premultiplied pixels; otherwise straight alpha is returned.
    pub fn decode_frame(&self, index: usize, for_display: bool) -> Option<FrameBitmap> {
        self.try_decode_frame(index, for_display).ok()
    }

    /// Like [`IncrementalDecoder::decode_frame`], reporting why nothing was produced.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn try_decode_frame(
        &self,
        index: usize,
        for_display: bool,
    ) -> Result<FrameBitmap, FrameUnavailable> {
        let (data, records, source, canvas) = {
            let st = self.read();
            if index >= st.records.len() {
                return Err(FrameUnavailable::Incomplete);
            }
            let Some(source) = st.source.clone() else {
                return Err(FrameUnavailable::Incomplete);
            };
            (
                Arc::clone(&st.data),
                Arc::clone(&st.records),
                source,
                st.meta.canvas(),
            )
        };

        let mut slot = self.lock_compositor();
        if slot.as_ref().is_some_and(|c| c.canvas() != canvas) {
            *slot = None;
        }
        let comp = slot.get_or_insert_with(|| Compositor::new(canvas));

        let start = replay_start(comp, &records, index, canvas);
        if start > index {
            return Ok(comp.snapshot(for_display));
        }
        if comp.last_index().is_none_or(|last| last + 1 != start) {
            comp.reset();
        }

        for record in &records[start..=index] {
            match source.decode_frame(&data, record, for_display) {
                Ok(raw) => comp.composite(record, &raw),
                Err(e) => {
                    tracing::warn!(
                        frame = record.index,
                        requested = index,
                        error = %e,
                        "frame unavailable"
                    );
                    comp.reset();
                    return Err(FrameUnavailable::Corrupt);
                }
            }
        }
        Ok(comp.snapshot(for_display))
    }
}

/// First index to composite so the canvas ends at `target`; `target + 1` means it already does.
fn replay_start(
    comp: &Compositor,
    records: &[FrameRecord],
    target: usize,
    canvas: CanvasSize,
) -> usize {
    let independent = blend_start_index(records, target, canvas);
    match comp.last_index() {
        Some(last) if last == target => target + 1,
        Some(last) if last < target && last + 1 >= independent => last + 1,
        _ => independent,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/incremental.rs"]
mod tests;
