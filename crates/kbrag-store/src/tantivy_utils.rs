use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};
use tantivy::Index;

use kbrag_core::types::DocumentField;

pub const TEXT_TOKENIZER: &str = "text_with_stopwords";
pub const EXACT_TOKENIZER: &str = "exact_lowercase";

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of",
    "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them",
    "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who",
    "whom", "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did",
    "have", "had", "having",
];

/// Schema fields, one per `DocumentField`.
#[derive(Debug, Clone, Copy)]
pub struct DocFields {
    pub id: Field,
    pub title: Field,
    pub content: Field,
    pub category: Field,
    pub source: Field,
}

impl DocFields {
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            id: schema.get_field(DocumentField::Id.as_str())?,
            title: schema.get_field(DocumentField::Title.as_str())?,
            content: schema.get_field(DocumentField::Content.as_str())?,
            category: schema.get_field(DocumentField::Category.as_str())?,
            source: schema.get_field(DocumentField::Source.as_str())?,
        })
    }

    pub fn get(&self, field: DocumentField) -> Field {
        match field {
            DocumentField::Id => self.id,
            DocumentField::Title => self.title,
            DocumentField::Content => self.content,
            DocumentField::Category => self.category,
            DocumentField::Source => self.source,
        }
    }
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let exact_indexing = TextFieldIndexing::default()
        .set_tokenizer(EXACT_TOKENIZER)
        .set_index_option(IndexRecordOption::Basic);
    let exact_options = TextOptions::default().set_indexing_options(exact_indexing).set_stored();
    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer(TEXT_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(text_indexing).set_stored();

    for field in DocumentField::ALL {
        let options = if field.is_exact() { exact_options.clone() } else { text_options.clone() };
        schema_builder.add_text_field(field.as_str(), options);
    }
    schema_builder.build()
}

pub fn register_tokenizers(index: &Index) {
    let text = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
        .build();
    let exact = TextAnalyzer::builder(RawTokenizer::default()).filter(LowerCaser).build();
    index.tokenizers().register(TEXT_TOKENIZER, text);
    index.tokenizers().register(EXACT_TOKENIZER, exact);
}

/// Terms `text` produces under the analyzer registered as `name`.
pub fn analyze(index: &Index, name: &str, text: &str) -> Vec<String> {
    let Some(mut analyzer) = index.tokenizers().get(name) else {
        return Vec::new();
    };
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}
