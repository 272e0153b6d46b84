// src/sources/generator.rs
//! Calendar-driven fallback source. Never fails and needs no network.
//!
//! Output for a given instant: weekday, season, month and hour-of-day tags, then
//! a date-hashed rotation through the domain tag pool. Same instant, same tags.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use sha2::{Digest, Sha256};

use super::{ranked_candidates, FetchContext, SourceAdapter};
use crate::candidate::Candidate;
use crate::error::SourceError;

pub const GENERATOR_ID: &str = "generator";

const DOMAIN_TAGS_PER_DAY: usize = 3;

const DOMAIN_TAGS: &[&str] = &[
    "GPUComputing", "CloudGPU", "HPCCloud", "AIInfra", "MLOps", "DeepLearning", "CloudNative",
    "Serverless", "K8s", "HighPerformance", "LowLatency", "FastCompute", "CostOptimized",
    "PayPerUse", "ElasticScale", "TechInnovation", "NextGenCompute", "FutureCloud",
];

const MONTH_TAGS: [&str; 12] = [
    "NewYearNewGoals",
    "ValentinesDay",
    "MarchMadness",
    "EarthMonth",
    "MayTheFourth",
    "GraduationSeason",
    "SummerBreak",
    "BackToSchool",
    "FallLaunch",
    "Hacktoberfest",
    "BlackFriday",
    "HolidaySeason",
];

fn weekday_tag(d: Weekday) -> &'static str {
    match d {
        Weekday::Mon => "MondayMotivation",
        Weekday::Tue => "TuesdayThoughts",
        Weekday::Wed => "WednesdayWisdom",
        Weekday::Thu => "ThrowbackThursday",
        Weekday::Fri => "FridayFeeling",
        Weekday::Sat => "SaturdayVibes",
        Weekday::Sun => "SundayFunday",
    }
}

fn season_tag(month: u32) -> &'static str {
    match month {
        12 | 1 | 2 => "WinterVibes",
        3..=5 => "SpringVibes",
        6..=8 => "SummerVibes",
        _ => "AutumnVibes",
    }
}

fn hour_tag(hour: u32) -> &'static str {
    match hour {
        5..=11 => "MorningMotivation",
        12..=17 => "AfternoonBoost",
        18..=22 => "EveningVibes",
        _ => "NightOwls",
    }
}

pub struct GeneratorAdapter {
    id: String,
}

impl Default for GeneratorAdapter {
    fn default() -> Self {
        Self::with_id(GENERATOR_ID)
    }
}

impl GeneratorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: &str) -> Self {
        Self { id: id.to_string() }
    }

    /// Raw tags for `now`, most calendar-specific first.
    pub fn tags_for(now: DateTime<Utc>) -> Vec<&'static str> {
        let month = now.month();
        let mut out = vec![
            weekday_tag(now.weekday()),
            season_tag(month),
            MONTH_TAGS[(month as usize).saturating_sub(1) % MONTH_TAGS.len()],
            hour_tag(now.hour()),
        ];
        let offset = date_hash(now) as usize % DOMAIN_TAGS.len();
        out.extend(
            DOMAIN_TAGS
                .iter()
                .cycle()
                .skip(offset)
                .take(DOMAIN_TAGS_PER_DAY)
                .copied(),
        );
        out
    }
}

fn date_hash(now: DateTime<Utc>) -> u64 {
    let digest = Sha256::digest(now.date_naive().to_string().as_bytes());
    digest
        .iter()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[async_trait]
impl SourceAdapter for GeneratorAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<Candidate>, SourceError> {
        Ok(ranked_candidates(Self::tags_for(ctx.now), &self.id, ctx.now))
    }
}
