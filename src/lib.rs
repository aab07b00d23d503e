//! The library code for the `pagewright` static site generator. A build can
//! be broken down into three distinct steps:
//!
//! 1. Loading posts from source files on disk ([`crate::post`])
//! 2. Writing post pages into the output tree, along with one copy per
//!    category and a listing page per category ([`crate::category`],
//!    [`crate::write`])
//! 3. Writing the pages that aggregate everything else: the landing page,
//!    the archive, the projects page ([`crate::index`]) and the sitemap
//!    ([`crate::sitemap`])
//!
//! The sitemap is computed from the pages actually present in the output
//! tree, so it always runs last. [`crate::build`] sequences the steps and
//! keeps a failure in one from aborting the others.
//!
//! The project data shown on the landing and projects pages is read from a
//! local snapshot which [`crate::projects::refresh`] updates out of band.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod category;
pub mod config;
pub mod documents;
pub mod index;
pub mod markdown;
pub mod post;
pub mod projects;
pub mod sitemap;
pub mod theme;
pub mod util;
pub mod write;
