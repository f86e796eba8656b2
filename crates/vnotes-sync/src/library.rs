use chrono::DateTime;
use chrono::Utc;
use indexmap::IndexMap;
use vnotes_store::Document;
use vnotes_store::DocumentId;

pub const UNTITLED_TITLE: &str = "Untitled Note";
pub const UNTITLED_CONTENT: &str = "# Untitled Note\n\nStart writing...";

const WELCOME_CONTENT: &str = "# Welcome to VoidNotes

This is your first note. You can edit it or create new ones.

## Features

- Create and organize notes
- Markdown support
- Tagging system
- Dark mode support";

const MARKDOWN_TIPS_CONTENT: &str = r#"# Markdown Tips

## Headers

# H1
## H2
### H3

## Lists

- Item 1
- Item 2
  - Nested item

## Code

```javascript
const hello = "world";
console.log(hello);
```"#;

/// In-memory copy of every document, newest first.
#[derive(Debug, Default)]
pub struct Library {
    documents: IndexMap<DocumentId, Document>,
}

impl Library {
    #[must_use]
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.id.clone(), doc))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn get_mut(&mut self, id: &DocumentId) -> Option<&mut Document> {
        self.documents.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    #[must_use]
    pub fn first_id(&self) -> Option<&DocumentId> {
        self.documents.keys().next()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn insert_first(&mut self, document: Document) {
        self.documents.shift_insert(0, document.id.clone(), document);
    }

    pub fn push(&mut self, document: Document) {
        self.documents.insert(document.id.clone(), document);
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        self.documents.shift_remove(id)
    }

    /// Documents matching `query`, in library order.
    pub fn search<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.iter().filter(move |doc| doc.matches(query))
    }

    /// A fresh id derived from the creation time in milliseconds, bumped until it
    /// does not collide with an existing document.
    #[must_use]
    pub fn next_id(&self, now: DateTime<Utc>) -> DocumentId {
        let mut millis = now.timestamp_millis();
        loop {
            let id = DocumentId::new(millis.to_string());
            if !self.contains(&id) {
                return id;
            }
            millis += 1;
        }
    }
}

/// A new, empty-ish document with the default title and body.
#[must_use]
pub fn untitled(id: DocumentId, now: DateTime<Utc>) -> Document {
    Document::new(id, UNTITLED_TITLE, UNTITLED_CONTENT, now)
}

/// Notes offered to a user whose store is empty.
#[must_use]
pub fn starter_documents(now: DateTime<Utc>) -> Vec<Document> {
    vec![
        Document::new("1", "Welcome to VoidNotes", WELCOME_CONTENT, now).with_tags(["welcome", "info"]),
        Document::new("2", "Markdown Tips", MARKDOWN_TIPS_CONTENT, now).with_tags(["markdown", "tips"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_skips_taken() {
        let now = Utc::now();
        let millis = now.timestamp_millis();
        let library = Library::new(vec![Document::new(millis.to_string(), "t", "c", now)]);

        let id = library.next_id(now);
        assert_eq!(id.as_str(), (millis + 1).to_string());
    }

    #[test]
    fn test_insert_first_and_remove_keep_order() {
        let now = Utc::now();
        let mut library = Library::new(vec![
            Document::new("a", "A", "", now),
            Document::new("b", "B", "", now),
        ]);
        library.insert_first(Document::new("c", "C", "", now));
        assert_eq!(library.first_id(), Some(&DocumentId::new("c")));

        library.remove(&"c".into());
        let ids: Vec<_> = library.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_search() {
        let library = Library::new(starter_documents(Utc::now()));
        let hits: Vec<_> = library.search("TIPS").map(|d| d.title.as_str()).collect();
        assert_eq!(hits, ["Markdown Tips"]);
        assert_eq!(library.search("").count(), 2);
    }

    #[test]
    fn test_starter_documents() {
        let docs = starter_documents(Utc::now());
        assert_eq!(docs.len(), 2);
        assert!(docs[0].tags.contains("welcome"));
        assert!(docs[1].content.ends_with("```"));
    }
}
