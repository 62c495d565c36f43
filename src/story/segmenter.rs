use crate::config::{MAX_CHARS_PER_SCENE, MAX_SCENES, SCENE_BREAK};
use crate::story::error::StoryError;
use crate::story::types::Scene;

const PREVIEW_CHARS: usize = 200;

/// Splits drafted story text into bounded scenes.
///
/// Fragments are delimited by the scene marker. Fragments longer than the
/// per-scene cap are re-chunked on `.` boundaries by greedy packing; a
/// single sentence longer than the cap is kept whole. The final list is
/// truncated to the scene limit. Lengths count Unicode scalar values.
#[derive(Debug, Clone)]
pub struct SceneSegmenter {
    marker: String,
    max_chars: usize,
    max_scenes: usize,
}

impl Default for SceneSegmenter {
    fn default() -> Self {
        Self::new(SCENE_BREAK, MAX_CHARS_PER_SCENE, MAX_SCENES)
    }
}

impl SceneSegmenter {
    pub fn new(marker: &str, max_chars: usize, max_scenes: usize) -> Self {
        Self {
            marker: marker.to_string(),
            max_chars,
            max_scenes,
        }
    }

    pub fn segment(&self, raw_text: &str) -> Result<Vec<Scene>, StoryError> {
        let fragments: Vec<&str> = raw_text
            .split(self.marker.as_str())
            .map(str::trim)
            .filter(|fragment| !fragment.is_empty())
            .collect();

        let mut texts = Vec::new();
        for fragment in fragments {
            if char_len(fragment) <= self.max_chars {
                texts.push(fragment.to_string());
            } else {
                texts.extend(self.rechunk(fragment));
            }
        }
        texts.truncate(self.max_scenes);

        if texts.is_empty() {
            return Err(StoryError::NoScenes {
                marker: self.marker.clone(),
                marker_count: raw_text.matches(self.marker.as_str()).count(),
                preview: preview(raw_text),
            });
        }

        Ok(texts
            .into_iter()
            .enumerate()
            .map(|(offset, text)| Scene {
                index: offset + 1,
                text,
            })
            .collect())
    }

    fn rechunk(&self, fragment: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut chunk = String::new();
        for sentence in fragment.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            let candidate = format!("{chunk} {sentence}.").trim().to_string();
            if char_len(&candidate) > self.max_chars && !chunk.is_empty() {
                chunks.push(std::mem::take(&mut chunk));
                chunk = format!("{sentence}.");
            } else {
                chunk = candidate;
            }
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn preview(raw_text: &str) -> String {
    let trimmed = raw_text.trim();
    if char_len(trimmed) <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(scenes: &[Scene]) -> Vec<&str> {
        scenes.iter().map(|scene| scene.text.as_str()).collect()
    }

    fn sentence(letter: char, len: usize) -> String {
        std::iter::repeat(letter).take(len).collect()
    }

    #[test]
    fn splits_on_custom_marker() {
        let segmenter = SceneSegmenter::new("[MARK]", 300, 15);
        let scenes = segmenter.segment("A[MARK]B[MARK]C").unwrap();
        assert_eq!(texts(&scenes), vec!["A", "B", "C"]);
        assert_eq!(
            scenes.iter().map(|scene| scene.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn drops_blank_fragments_and_trims() {
        let segmenter = SceneSegmenter::default();
        let raw = "  Snow fell softly. [SCENE_BREAK]\n\n[SCENE_BREAK]  Mia smiled.  [SCENE_BREAK]\n";
        let scenes = segmenter.segment(raw).unwrap();
        assert_eq!(texts(&scenes), vec!["Snow fell softly.", "Mia smiled."]);
    }

    #[test]
    fn text_without_markers_is_one_scene() {
        let scenes = SceneSegmenter::default()
            .segment("Once upon a snowy night, a fox found a lantern.")
            .unwrap();
        assert_eq!(texts(&scenes), vec!["Once upon a snowy night, a fox found a lantern."]);
    }

    #[test]
    fn rechunks_long_fragment_on_sentence_boundaries() {
        let sentences: Vec<String> = ('a'..='h').map(|letter| sentence(letter, 76)).collect();
        let fragment = sentences
            .iter()
            .map(|s| format!("{s}."))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(fragment.chars().count() > 600);

        let scenes = SceneSegmenter::new("[MARK]", 300, 15).segment(&fragment).unwrap();
        assert_eq!(scenes.len(), 3);
        for scene in &scenes {
            assert!(scene.text.chars().count() <= 300, "{}", scene.text);
        }
        let rejoined = texts(&scenes).join(" ");
        assert_eq!(rejoined, fragment);
        assert_eq!(
            scenes[0].text,
            format!("{}. {}. {}.", sentences[0], sentences[1], sentences[2])
        );
        assert_eq!(scenes[2].text, format!("{}. {}.", sentences[6], sentences[7]));
    }

    #[test]
    fn keeps_oversize_single_sentence_whole() {
        let long = sentence('z', 350);
        let raw = format!("Short start.[SCENE_BREAK]{long}. Tiny end.");
        let scenes = SceneSegmenter::default().segment(&raw).unwrap();
        assert_eq!(
            texts(&scenes),
            vec!["Short start.".to_string(), format!("{long}."), "Tiny end.".to_string()]
        );
    }

    #[test]
    fn measures_length_in_characters() {
        let accented = "é".repeat(290);
        let scenes = SceneSegmenter::default().segment(&accented).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].text, accented);
    }

    #[test]
    fn truncates_to_scene_limit_in_order() {
        let raw = (1..=20)
            .map(|n| format!("Scene {n}"))
            .collect::<Vec<_>>()
            .join("[MARK]");
        let scenes = SceneSegmenter::new("[MARK]", 300, 15).segment(&raw).unwrap();
        let expected: Vec<String> = (1..=15).map(|n| format!("Scene {n}")).collect();
        assert_eq!(texts(&scenes), expected);
        assert_eq!(scenes.last().map(|scene| scene.index), Some(15));
    }

    #[test]
    fn bounds_hold_for_mixed_input() {
        let mut raw = String::new();
        for n in 0..40 {
            if n % 3 == 0 {
                raw.push_str(&format!("{}. {}. {}.", sentence('q', 120), sentence('r', 150), sentence('s', 90)));
            } else {
                raw.push_str(&format!("Line {n} of the story."));
            }
            raw.push_str(SCENE_BREAK);
        }
        let scenes = SceneSegmenter::default().segment(&raw).unwrap();
        assert!(!scenes.is_empty());
        assert!(scenes.len() <= MAX_SCENES);
        for scene in &scenes {
            assert!(!scene.text.trim().is_empty());
            assert!(scene.text.chars().count() <= MAX_CHARS_PER_SCENE);
        }
    }

    #[test]
    fn empty_output_is_fatal_with_diagnostics() {
        let segmenter = SceneSegmenter::default();
        for raw in ["", "   \n", "[SCENE_BREAK] [SCENE_BREAK]\n[SCENE_BREAK]"] {
            match segmenter.segment(raw) {
                Err(StoryError::NoScenes {
                    marker,
                    marker_count,
                    preview,
                }) => {
                    assert_eq!(marker, SCENE_BREAK);
                    assert_eq!(marker_count, raw.matches(SCENE_BREAK).count());
                    assert_eq!(preview, raw.trim());
                }
                other => panic!("expected NoScenes, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversize_fragment_of_periods_only_yields_nothing() {
        let raw = ".".repeat(400);
        assert!(matches!(
            SceneSegmenter::default().segment(&raw),
            Err(StoryError::NoScenes { .. })
        ));
    }
}
