//! An in-memory ordered key-value index backed by a B+ tree.
//!
//! This crate provides [`WeftTree`], an ordered index whose key order is a
//! caller-supplied comparator rather than an `Ord` bound. On top of the
//! usual point operations it supports:
//!
//! - **Optional values** - keys may be stored with or without a payload,
//!   so the same tree serves as a map or a multiset.
//! - **Duplicate counting** - inserting an equal key again overwrites the
//!   stored key and value (the latest write wins on lookup) while a
//!   per-slot counter tracks the multiplicity; [`len`](WeftTree::len)
//!   counts every insert.
//! - **Paginated range scans** - [`range`](WeftTree::range) walks the
//!   doubly-linked leaf chain between two optional closed bounds with
//!   offset/limit pagination.
//! - **Predicate scans** - [`find`](WeftTree::find) filters every key with
//!   an arbitrary predicate and can resume from a bookmark key.
//! - **Order statistics** - [`median_key`](WeftTree::median_key) locates
//!   the middle element (duplicates included) with a single leaf walk.
//!
//! # Example
//!
//! ```
//! use weft_tree::WeftTree;
//!
//! let mut tree = WeftTree::new(4, |a: &i32, b: &i32| a.cmp(b)).unwrap();
//!
//! tree.insert(3, Some("three")).unwrap();
//! tree.insert(1, Some("one")).unwrap();
//! tree.insert(2, Some("two")).unwrap();
//!
//! assert_eq!(tree.get(&2), Some(&"two"));
//! assert_eq!(tree.len(), 3);
//!
//! let keys: Vec<&i32> = tree.range_keys(None, None, 0, None);
//! assert_eq!(keys, [&1, &2, &3]);
//! ```
//!
//! # Implementation
//!
//! The tree is a B+ tree: all data lives in the leaves, the leaves form a
//! doubly-linked chain, and interior nodes hold separator keys. Each node's
//! cell sequence is itself a sorted doubly-linked list whose entries live in
//! an arena owned by the tree, so rebalancing splices links instead of
//! moving elements and every back-reference (parent, sibling, parent cell)
//! is a plain index.
//!
//! The tree is a single-owner, single-threaded structure: no locks, no
//! interior mutability. Callers that need shared access wrap it in their
//! own synchronization.

#![no_std]
// These forbid rules and lint groups are meant to be very restrictive.
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
// Enable coverage attributes for nightly builds.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

mod error;
mod raw;
mod tree;

pub use error::{TreeError, TreeResult};
pub use raw::SearchMode;
pub use tree::WeftTree;
