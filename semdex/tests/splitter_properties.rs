//! Property tests for recursive character splitting.

use proptest::prelude::*;
use semdex::{RecursiveCharacterSplitter, SplitterConfig, TextSplitter};

/// Prose-like text: words, punctuation, line and paragraph breaks, and some
/// multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            6 => "[a-zA-Z]{1,12}",
            2 => Just(" ".to_string()),
            1 => Just(". ".to_string()),
            1 => Just("\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => "[éßøλ語]{1,4}",
        ],
        0..80,
    )
    .prop_map(|parts| parts.concat())
}

/// Sizes with `overlap < size`.
fn arb_sizes() -> impl Strategy<Value = (usize, usize)> {
    (1usize..60).prop_flat_map(|size| (Just(size), 0..size))
}

/// **Splitting is deterministic and bounded**
/// *For any* text and valid sizes, splitting twice yields identical chunks,
/// no chunk is empty, and no chunk is longer than `chunk_size` characters.
mod prop_split_bounded {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_deterministic_nonempty_and_bounded(
            text in arb_text(),
            (size, overlap) in arb_sizes(),
        ) {
            let splitter = RecursiveCharacterSplitter::new(size, overlap).unwrap();
            let first = splitter.split_text(&text);
            let second = splitter.split_text(&text);
            prop_assert_eq!(&first, &second);

            for chunk in &first {
                prop_assert!(!chunk.is_empty());
                prop_assert!(
                    chunk.chars().count() <= size,
                    "chunk {:?} longer than {}", chunk, size
                );
            }
        }

        #[test]
        fn short_text_is_a_single_chunk(text in arb_text()) {
            let splitter = RecursiveCharacterSplitter::new(10_000, 0).unwrap();
            let chunks = splitter.split_text(&text);
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks, vec![text.trim().to_string()]);
            }
        }
    }
}

/// **Offsets point back into the source**
/// *For any* text, each chunk's `start` is the character offset where the
/// chunk's text occurs in the source.
mod prop_split_offsets {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn offsets_locate_chunks(text in arb_text(), (size, overlap) in arb_sizes()) {
            let splitter = RecursiveCharacterSplitter::new(size, overlap).unwrap();
            for chunk in splitter.split_text_with_offsets(&text) {
                let located: String =
                    text.chars().skip(chunk.start).take(chunk.text.chars().count()).collect();
                prop_assert_eq!(located, chunk.text);
            }
        }
    }
}

/// **Adjacent chunks share exactly `chunk_overlap` characters**
/// *For any* whitespace-free text cut character by character, the trailing
/// `chunk_overlap` characters of each chunk open the next one, and the
/// chunks together cover the whole text.
mod prop_split_overlap {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn trailing_overlap_opens_next_chunk(
            text in "[a-z]{0,200}",
            (size, overlap) in arb_sizes(),
        ) {
            let config = SplitterConfig::builder()
                .chunk_size(size)
                .chunk_overlap(overlap)
                .separators([""])
                .build()
                .unwrap();
            let splitter = RecursiveCharacterSplitter::from_config(config).unwrap();
            let chunks: Vec<Vec<char>> =
                splitter.split_text(&text).iter().map(|c| c.chars().collect()).collect();

            for pair in chunks.windows(2) {
                let (previous, next) = (&pair[0], &pair[1]);
                prop_assert_eq!(previous.len(), size);
                prop_assert!(next.len() > overlap);
                prop_assert_eq!(&previous[size - overlap..], &next[..overlap]);
            }

            let mut rebuilt: String = chunks.first().map(|c| c.iter().collect()).unwrap_or_default();
            for chunk in chunks.iter().skip(1) {
                rebuilt.extend(&chunk[overlap..]);
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
