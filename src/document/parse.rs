use super::{Document, NodeId, VOID_ELEMENTS};
use crate::error::{ReaderError, Result};
use quick_xml::Reader;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};

pub(super) fn parse_markup(markup: &str) -> Result<Document> {
    let mut doc = Document::new();
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = false;
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;

    let mut buf = Vec::new();
    let mut stack: Vec<NodeId> = vec![doc.root()];

    loop {
        let top = *stack.last().unwrap_or(&doc.root());
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let (name, attrs) = read_element(&e, &reader)?;
                let void = VOID_ELEMENTS.contains(&name.as_str());
                let id = doc.create_element(&name, attrs);
                doc.append_child(top, id);
                if !void {
                    stack.push(id);
                }
            }
            Ok(Event::Empty(e)) => {
                let (name, attrs) = read_element(&e, &reader)?;
                let id = doc.create_element(&name, attrs);
                doc.append_child(top, id);
            }
            Ok(Event::End(e)) => {
                let name = decode(e.name().as_ref(), &reader)?.to_ascii_lowercase();
                // Close the nearest open element with this name; stray end
                // tags are ignored.
                if let Some(index) = stack
                    .iter()
                    .skip(1)
                    .rposition(|&open| doc.element_name(open) == Some(name.as_str()))
                {
                    stack.truncate(index + 1);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .decode()
                    .map_err(|err| ReaderError::Markup(format!("Decode error: {:?}", err)))?;
                push_text(&mut doc, top, &text);
            }
            Ok(Event::CData(e)) => {
                let text = decode(&e, &reader)?;
                push_text(&mut doc, top, &text);
            }
            Ok(Event::GeneralRef(e)) => {
                let text = match e.resolve_char_ref() {
                    Ok(Some(c)) => c.to_string(),
                    _ => {
                        let entity = e.decode().map_err(|err| {
                            ReaderError::Markup(format!("Decode error: {:?}", err))
                        })?;
                        resolve_entity(&entity)
                    }
                };
                push_text(&mut doc, top, &text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(ReaderError::Markup(format!(
                    "Malformed markup at byte {}: {}",
                    reader.error_position(),
                    err
                )));
            }
        }
        buf.clear();
    }

    let root = doc.root();
    doc.normalize(root);
    Ok(doc)
}

fn read_element(e: &BytesStart, reader: &Reader<&[u8]>) -> Result<(String, Vec<(String, String)>)> {
    let name = decode(e.name().as_ref(), reader)?.to_ascii_lowercase();
    let mut attrs = Vec::new();
    for attr in e.attributes().with_checks(false).flatten() {
        let key = decode(attr.key.as_ref(), reader)?.to_ascii_lowercase();
        let raw = decode(&attr.value, reader)?;
        let value = unescape_with(&raw, resolve_html5_entity)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.clone());
        attrs.push((key, value));
    }
    Ok((name, attrs))
}

fn decode(bytes: &[u8], reader: &Reader<&[u8]>) -> Result<String> {
    reader
        .decoder()
        .decode(bytes)
        .map(|s| s.into_owned())
        .map_err(|e| ReaderError::Markup(format!("Decode error: {:?}", e)))
}

fn push_text(doc: &mut Document, parent: NodeId, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(&last) = doc.children(parent).last()
        && let Some(existing) = doc.text(last)
    {
        let merged = format!("{}{}", existing, text);
        doc.set_text(last, &merged);
        return;
    }
    let id = doc.create_text(text);
    doc.append_child(parent, id);
}

/// Resolve a named entity reference body (`amp`, `eacute`). Unknown names
/// are kept as written.
fn resolve_entity(entity: &str) -> String {
    match resolve_html5_entity(entity) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{};", entity),
    }
}
