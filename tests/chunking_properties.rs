/// Token-window properties of the chunker over realistic script text
use scriptrag::chunking::{BpeTokenizer, Chunker, ChunkingParams, Tokenizer, CHUNK_SIZE, OVERLAP};
use scriptrag::documents::Document;
use std::sync::Arc;

// Every word here is a single cl100k token when preceded by a space, so a
// decoded window re-encodes to exactly the tokens it was cut from.
const WORDS: &[&str] = &[
    "the", "man", "walks", "into", "the", "room", "and", "she", "looks", "at", "him", "then",
    "they", "run", "out", "of", "house", "in", "rain",
];

fn script_text(word_count: usize) -> String {
    let mut words = Vec::with_capacity(word_count);
    for i in 0..word_count {
        words.push(WORDS[(i * 7 + i / 3) % WORDS.len()]);
    }
    words.join(" ")
}

fn default_chunker() -> (Arc<BpeTokenizer>, Chunker) {
    let tokenizer = Arc::new(BpeTokenizer::cl100k().unwrap());
    let chunker = Chunker::new(tokenizer.clone(), ChunkingParams::default());
    (tokenizer, chunker)
}

#[test]
fn test_empty_document() {
    let (_, chunker) = default_chunker();
    assert!(chunker.chunk("", "Title").unwrap().is_empty());
}

#[test]
fn test_window_sizes_and_coverage() {
    let (tokenizer, chunker) = default_chunker();
    let text = script_text(3000);
    let total_tokens = tokenizer.count(&text);
    assert!(total_tokens > 2 * CHUNK_SIZE);

    let chunks = chunker.chunk(&text, "Long_Film").unwrap();
    assert_eq!(chunks.len(), total_tokens.div_ceil(CHUNK_SIZE - OVERLAP));

    let lengths: Vec<usize> = chunks.iter().map(|c| tokenizer.count(&c.text)).collect();
    assert!(lengths.iter().all(|&len| len <= CHUNK_SIZE));
    assert_eq!(lengths[0], CHUNK_SIZE);
    assert!(lengths.iter().sum::<usize>() >= total_tokens);
    assert!(lengths.last().unwrap() <= &CHUNK_SIZE);
}

#[test]
fn test_consecutive_windows_overlap() {
    let (tokenizer, chunker) = default_chunker();
    let text = script_text(2000);

    let chunks = chunker.chunk(&text, "Overlap").unwrap();
    assert!(chunks.len() >= 3);

    let first = tokenizer.encode(&chunks[0].text);
    let second = tokenizer.encode(&chunks[1].text);
    assert_eq!(first.len(), CHUNK_SIZE);
    assert_eq!(&first[CHUNK_SIZE - OVERLAP..], &second[..OVERLAP]);
}

#[test]
fn test_ids_are_sequential_without_gaps() {
    let (_, chunker) = default_chunker();
    let doc = Document::normalized("The_Dark Knight", &script_text(1500));

    let chunks = chunker.chunk(&doc.text, &doc.key()).unwrap();
    let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    let expected: Vec<String> = (1..=chunks.len())
        .map(|n| format!("The_Dark_Knight_{}", n))
        .collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_rechunking_is_stable() {
    let (_, chunker) = default_chunker();
    let text = script_text(1200);

    let first = chunker.chunk(&text, "Tenet").unwrap();
    let second = chunker.chunk(&text, "Tenet").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_custom_parameters() {
    let tokenizer = Arc::new(BpeTokenizer::cl100k().unwrap());
    let chunker = Chunker::new(tokenizer.clone(), ChunkingParams::new(100, 20).unwrap());
    let text = script_text(450);
    let total = tokenizer.count(&text);

    let chunks = chunker.chunk(&text, "Custom").unwrap();
    assert_eq!(chunks.len(), total.div_ceil(80));
    assert!(chunks.iter().all(|c| tokenizer.count(&c.text) <= 100));
}
