use std::fmt;

pub mod classifier;
pub mod commands;
pub mod reconciler;
pub mod resolver;

#[cfg(test)]
mod fakes;

#[derive(Debug)]
pub struct CollectionError;

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Collection error")
    }
}

impl std::error::Error for CollectionError {}

pub type CollectionResult<T> = error_stack::Result<T, CollectionError>;
