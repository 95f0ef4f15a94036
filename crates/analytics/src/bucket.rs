// Copyright (C) 2025-present The tripstream Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Grouping of time-ordered records into one batch per time bucket.

use crate::{
    batch::{BatchBuilder, ColumnarBatch, TimeSeriesRecord},
    error::BatchError,
    Timestamp,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Display, EnumString, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    /// Weeks start on Monday
    Weekly,
    Monthly,
}

fn start_of_day(date: NaiveDate) -> Timestamp {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl Frequency {
    /// Start of the bucket containing the given timestamp
    pub fn bucket_start(&self, ts: Timestamp) -> Timestamp {
        let date = ts.date_naive();
        match self {
            Self::Hourly => start_of_day(date) + Duration::hours(ts.hour() as i64),
            Self::Daily => start_of_day(date),
            Self::Weekly => start_of_day(
                date - Duration::days(date.weekday().num_days_from_monday() as i64),
            ),
            Self::Monthly => start_of_day(date - Duration::days(date.day0() as i64)),
        }
    }

    /// Start of the bucket following the one starting at `start`
    pub fn next_bucket(&self, start: Timestamp) -> Timestamp {
        match self {
            Self::Hourly => start + Duration::hours(1),
            Self::Daily => start + Duration::days(1),
            Self::Weekly => start + Duration::days(7),
            // Any day of the next month, truncated back to its first day
            Self::Monthly => self.bucket_start(self.bucket_start(start) + Duration::days(32)),
        }
    }
}

/// Iterator adaptor turning time-ordered records into one `ColumnarBatch` per
/// bucket.
///
/// By default only buckets holding at least one record produce a batch. With
/// `with_gaps(true)` every bucket between the first and the last record
/// produces a batch, possibly empty. Empty batches are produced one at a time
/// as the iterator is advanced.
pub struct Batching<I, R> {
    source: I,
    frequency: Frequency,
    builder: BatchBuilder,
    current: Option<Timestamp>,
    gaps: bool,
    /// First record of a later bucket, held until the buckets before it are out
    pending: Option<R>,
    done: bool,
}

impl<I, R> Batching<I, R> {
    pub fn new<C, S>(source: I, frequency: Frequency, columns: C) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            frequency,
            builder: BatchBuilder::new(columns),
            current: None,
            gaps: false,
            pending: None,
            done: false,
        }
    }

    pub fn with_gaps(mut self, gaps: bool) -> Self {
        self.gaps = gaps;
        self
    }
}

impl<I, R> Batching<I, R>
where
    I: Iterator<Item = R>,
    R: TimeSeriesRecord,
{
    fn start_bucket(&mut self, bucket: Timestamp, record: &R) -> Option<BatchError> {
        self.current = Some(bucket);
        let err = self.builder.push(record).err();
        if err.is_some() {
            self.done = true;
        }
        err
    }

    /// Emits the next empty gap batch before `record`, or opens its bucket
    fn resume(&mut self, record: R) -> Option<Result<ColumnarBatch, BatchError>> {
        let bucket = self.frequency.bucket_start(record.get_ts());
        if self.gaps {
            if let Some(current) = self.current {
                let next = self.frequency.next_bucket(current);
                if next < bucket {
                    self.current = Some(next);
                    self.pending = Some(record);
                    return Some(Ok(self.builder.finish()));
                }
            }
        }
        self.start_bucket(bucket, &record).map(Err)
    }
}

impl<I, R> Iterator for Batching<I, R>
where
    I: Iterator<Item = R>,
    R: TimeSeriesRecord,
{
    type Item = Result<ColumnarBatch, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.take() {
                match self.resume(record) {
                    Some(item) => return Some(item),
                    None => continue,
                }
            }
            if self.done {
                return None;
            }
            match self.source.next() {
                Some(record) => {
                    let bucket = self.frequency.bucket_start(record.get_ts());
                    match self.current {
                        Some(current) if bucket < current => {
                            self.done = true;
                            return Some(Err(BatchError::UnorderedTimestamps));
                        }
                        Some(current) if bucket > current => {
                            self.pending = Some(record);
                            return Some(Ok(self.builder.finish()));
                        }
                        _ => {
                            if let Some(err) = self.start_bucket(bucket, &record) {
                                return Some(Err(err));
                            }
                        }
                    }
                }
                None => {
                    self.done = true;
                    if !self.builder.is_empty() {
                        return Some(Ok(self.builder.finish()));
                    }
                }
            }
        }
    }
}

pub trait BatchingExt<R: TimeSeriesRecord>: Iterator<Item = R> + Sized {
    /// Groups records into batches of `frequency` buckets holding the given
    /// numeric columns
    fn batch_by<C, S>(self, frequency: Frequency, columns: C) -> Batching<Self, R>
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Batching::new(self, frequency, columns)
    }
}

impl<R: TimeSeriesRecord, I: Iterator<Item = R>> BatchingExt<R> for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::RecordBatch;
    use chrono::{TimeZone, Utc};

    #[derive(Debug, Clone)]
    struct Trip {
        ts: Timestamp,
        fare: f64,
    }

    impl TimeSeriesRecord for Trip {
        fn get_ts(&self) -> Timestamp {
            self.ts
        }
        fn get_value(&self, column: &str) -> Option<f64> {
            (column == "fare").then_some(self.fare)
        }
    }

    fn at(month: u32, day: u32, hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2015, month, day, hour, 0, 0).unwrap()
    }

    fn trip(month: u32, day: u32, hour: u32, fare: f64) -> Trip {
        Trip {
            ts: at(month, day, hour),
            fare,
        }
    }

    #[test]
    fn test_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2015, 1, 15, 13, 42, 7).unwrap();
        assert_eq!(Frequency::Hourly.bucket_start(ts), at(1, 15, 13));
        assert_eq!(Frequency::Daily.bucket_start(ts), at(1, 15, 0));
        // 2015-01-15 is a Thursday
        assert_eq!(Frequency::Weekly.bucket_start(ts), at(1, 12, 0));
        assert_eq!(Frequency::Monthly.bucket_start(ts), at(1, 1, 0));
    }

    #[test]
    fn test_next_bucket() {
        assert_eq!(Frequency::Hourly.next_bucket(at(1, 31, 23)), at(2, 1, 0));
        assert_eq!(Frequency::Daily.next_bucket(at(1, 31, 0)), at(2, 1, 0));
        assert_eq!(Frequency::Weekly.next_bucket(at(1, 26, 0)), at(2, 2, 0));
        assert_eq!(Frequency::Monthly.next_bucket(at(1, 1, 0)), at(2, 1, 0));
        assert_eq!(Frequency::Monthly.next_bucket(at(2, 1, 0)), at(3, 1, 0));
    }

    #[test]
    fn test_frequency_parse() {
        assert_eq!("weekly".parse::<Frequency>(), Ok(Frequency::Weekly));
        assert_eq!(Frequency::Daily.to_string(), "daily");
    }

    #[test]
    fn test_batch_by_day() {
        let trips = vec![
            trip(1, 1, 1, 5.0),
            trip(1, 1, 22, 7.0),
            trip(1, 2, 3, 1.0),
            trip(1, 4, 3, 2.0),
        ];
        let batches: Vec<_> = trips
            .into_iter()
            .batch_by(Frequency::Daily, ["fare"])
            .collect::<Result<_, _>>()
            .unwrap();
        let sums: Vec<_> = batches
            .iter()
            .map(|b| b.column_sum("fare").unwrap())
            .collect();
        assert_eq!(sums, vec![12.0, 1.0, 2.0]);
        assert_eq!(batches[0].min_ts(), Some(at(1, 1, 1)));
        assert_eq!(batches[0].max_ts(), Some(at(1, 1, 22)));
    }

    #[test]
    fn test_batch_by_day_with_gaps() {
        let trips = vec![trip(1, 1, 1, 5.0), trip(1, 4, 3, 2.0)];
        let batches: Vec<_> = trips
            .into_iter()
            .batch_by(Frequency::Daily, ["fare"])
            .with_gaps(true)
            .collect::<Result<_, _>>()
            .unwrap();
        let lens: Vec<_> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(lens, vec![1, 0, 0, 1]);
        assert_eq!(batches[1].min_ts(), None);
    }

    #[test]
    fn test_gap_batches_are_produced_on_demand() {
        let far = Trip {
            ts: Utc.with_ymd_and_hms(2115, 1, 1, 0, 0, 0).unwrap(),
            fare: 9.0,
        };
        let mut batches = vec![trip(1, 1, 1, 5.0), far]
            .into_iter()
            .batch_by(Frequency::Hourly, ["fare"])
            .with_gaps(true);
        let lens: Vec<_> = batches
            .by_ref()
            .take(3)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(lens, vec![1, 0, 0]);
        let next = batches.next().unwrap().unwrap();
        assert!(next.is_empty());
        assert_eq!(next.min_ts(), None);
    }

    #[test]
    fn test_batch_by_week_with_gaps_keeps_last_record() {
        let trips = vec![trip(1, 5, 1, 1.0), trip(1, 7, 1, 2.0), trip(2, 2, 0, 3.0)];
        let batches: Vec<_> = trips
            .into_iter()
            .batch_by(Frequency::Weekly, ["fare"])
            .with_gaps(true)
            .collect::<Result<_, _>>()
            .unwrap();
        // Weeks of 5, 12, 19 and 26 January, then 2 February
        let sums: Vec<_> = batches
            .iter()
            .map(|b| b.column_sum("fare").unwrap())
            .collect();
        assert_eq!(sums, vec![3.0, 0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_batch_by_rejects_unordered() {
        let trips = vec![trip(1, 2, 1, 5.0), trip(1, 1, 3, 2.0), trip(1, 3, 3, 2.0)];
        let results: Vec<_> = trips
            .into_iter()
            .batch_by(Frequency::Daily, ["fare"])
            .collect();
        assert_eq!(results, vec![Err(BatchError::UnorderedTimestamps)]);
    }

    #[test]
    fn test_batch_by_empty_source() {
        let mut batches = std::iter::empty::<Trip>().batch_by(Frequency::Weekly, ["fare"]);
        assert!(batches.next().is_none());
    }
}
