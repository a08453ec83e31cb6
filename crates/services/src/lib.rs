pub mod documents;
pub mod knowledge_base;
pub mod media;
pub mod spreadsheet;

#[cfg(test)]
mod test_support;
