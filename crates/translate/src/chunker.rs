use voxdub_interface::{Transcript, TranslationChunk};

/// Groups transcript segments into translator-sized chunks by running
/// character count. Emission happens once the joined length reaches
/// `target`, or earlier when adding the next segment would pass `max`. A
/// single segment above `max` stands alone.
#[derive(Debug, Clone)]
pub struct Chunker {
    target: usize,
    max: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self { target: 400, max: 800 }
    }
}

impl Chunker {
    pub fn new(target: usize, max: usize) -> Self {
        assert!(target > 0 && max >= target, "chunker bounds out of order");
        Self { target, max }
    }

    pub fn chunk(&self, transcript: &Transcript) -> Vec<TranslationChunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<(usize, &str, f64, f64)> = Vec::new();
        let mut running = 0usize;

        let flush = |current: &mut Vec<(usize, &str, f64, f64)>,
                     chunks: &mut Vec<TranslationChunk>| {
            if current.is_empty() {
                return;
            }
            chunks.push(TranslationChunk {
                first_segment: current[0].0,
                source_texts: current.iter().map(|(_, t, _, _)| t.to_string()).collect(),
                translated_texts: Vec::new(),
                start_secs: current[0].2,
                end_secs: current.last().unwrap().3,
            });
            current.clear();
        };

        for (index, segment) in transcript.segments().iter().enumerate() {
            let len = segment.text.chars().count();

            if !current.is_empty() && running + len > self.max {
                flush(&mut current, &mut chunks);
                running = 0;
            }

            current.push((
                index,
                segment.text.as_str(),
                segment.start_secs,
                segment.end_secs,
            ));
            running += len;

            if running >= self.target {
                flush(&mut current, &mut chunks);
                running = 0;
            }
        }
        flush(&mut current, &mut chunks);
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxdub_interface::Segment;

    fn transcript(texts: &[&str]) -> Transcript {
        let segments = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Segment {
                start_secs: i as f64 * 10.0,
                end_secs: i as f64 * 10.0 + 5.0,
                text: t.to_string(),
                speaker: None,
                confidence: None,
            })
            .collect();
        Transcript::new(segments).unwrap()
    }

    #[test]
    fn accumulates_toward_target() {
        let t = transcript(&[&"a".repeat(150), &"b".repeat(150), &"c".repeat(150)]);
        let chunks = Chunker::default().chunk(&t);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_texts.len(), 3);
        assert_eq!(chunks[0].char_count(), 450);
    }

    #[test]
    fn splits_before_exceeding_max() {
        let t = transcript(&[&"a".repeat(390), &"b".repeat(500)]);
        let chunks = Chunker::default().chunk(&t);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_texts.len(), 1);
        assert_eq!(chunks[1].source_texts.len(), 1);
    }

    #[test]
    fn oversized_segment_stands_alone() {
        let t = transcript(&[&"a".repeat(900), "short"]);
        let chunks = Chunker::default().chunk(&t);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].char_count(), 900);
    }

    #[test]
    fn chunk_timestamps_span_members() {
        let t = transcript(&[&"a".repeat(200), &"b".repeat(250)]);
        let chunks = Chunker::default().chunk(&t);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_secs, 0.0);
        assert_eq!(chunks[0].end_secs, 15.0);
        assert_eq!(chunks[0].first_segment, 0);
    }

    #[test]
    fn empty_transcript_yields_no_chunks() {
        let t = Transcript::new(vec![]).unwrap();
        assert!(Chunker::default().chunk(&t).is_empty());
    }
}
