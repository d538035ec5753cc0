#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use polars::prelude::*;

use shelfwatch::credentials::{AwsCredentials, StaticProvider};
use shelfwatch::normalize::NormalizeOptions;
use shelfwatch::schema::product;
use shelfwatch::source::{ReadFuture, ReadRequest, TableSource};
use shelfwatch::{Loader, LoaderSettings, ShelfError};

/// In-memory stand-in for the lake table.
pub struct FrameSource {
    frame: Mutex<DataFrame>,
    reads: AtomicUsize,
    last_request: Mutex<Option<ReadRequest>>,
}

impl FrameSource {
    pub fn new(frame: DataFrame) -> Arc<Self> {
        Arc::new(Self {
            frame: Mutex::new(frame),
            reads: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn replace(&self, frame: DataFrame) {
        *self.frame.lock().unwrap() = frame;
    }

    pub fn last_request(&self) -> Option<ReadRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl TableSource for FrameSource {
    fn read<'a>(&'a self, request: &'a ReadRequest) -> ReadFuture<'a> {
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let frame = self.frame.lock().unwrap().clone();
            Ok(frame)
        })
    }
}

/// A table location that cannot be reached.
pub struct UnreachableSource;

impl TableSource for UnreachableSource {
    fn read<'a>(&'a self, request: &'a ReadRequest) -> ReadFuture<'a> {
        Box::pin(async move {
            Err(ShelfError::DataSourceUnreachable {
                uri: request.uri.clone(),
                reason: "NoSuchBucket".into(),
            })
        })
    }
}

pub fn settings(ttl: Duration) -> LoaderSettings {
    LoaderSettings {
        uri: "s3://test-bucket/sandbox/prices".into(),
        region: "us-west-2".into(),
        normalize: NormalizeOptions::default(),
        ttl,
    }
}

pub fn static_credentials() -> Arc<StaticProvider> {
    Arc::new(StaticProvider::new(AwsCredentials::new(
        "AKIATEST",
        "secret",
        Some("token".into()),
    )))
}

pub fn loader_for(source: Arc<dyn TableSource>, ttl: Duration) -> Loader {
    Loader::new(settings(ttl), source, static_credentials())
}

/// Raw rows as the lake returns them: text prices and text own_brand tokens.
pub fn raw_products(rows: &[(&str, &str, &str, &str, &str)]) -> DataFrame {
    df!(
        product::SUPERMARKET => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
        product::PRICES => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
        product::NAMES => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        product::DATE => vec!["2024-01-15"; rows.len()],
        product::OWN_BRAND => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
        product::CATEGORY => rows.iter().map(|r| r.4).collect::<Vec<_>>(),
        "_hoodie_commit_time" => vec!["20240115000000000"; rows.len()],
    )
    .unwrap()
}

pub fn sample_products() -> DataFrame {
    raw_products(&[
        ("Tesco", "2.0", "milk", "True", "dairy"),
        ("Aldi", "4.0", "milk", "True", "dairy"),
        ("Tesco", "10.0", "cheese", "FALSE", "dairy"),
        ("Lidl", "1.10", "bread", "FALSE", "bakery"),
        ("Aldi", "0.95", "bread", "True", "bakery"),
        ("Tesco", "3.50", "peas", "FALSE", "frozen"),
    ])
}
