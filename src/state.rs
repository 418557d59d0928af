use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::inbox::InboxAggregator;
use crate::search::GeoTextRankEngine;
use crate::source::DynDataSource;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub search: Arc<GeoTextRankEngine>,
    pub inbox: Arc<InboxAggregator>,
}

impl AppState {
    pub fn new(config: Config, source: DynDataSource) -> Self {
        Self {
            config,
            search: Arc::new(GeoTextRankEngine::new(source.clone())),
            inbox: Arc::new(InboxAggregator::new(source)),
        }
    }
}
