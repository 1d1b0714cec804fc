use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

const FIRST_YEAR: i32 = 2015;
const LAST_YEAR: i32 = 2020;
const OUTPUT_DIR: &str = "sample_data";

/// (state, county, baseline median AQI)
const COUNTIES: &[(&str, &str, f64)] = &[
    ("Ohio", "Lake", 38.0),
    ("Ohio", "Erie", 44.0),
    ("Ohio", "Cuyahoga", 52.0),
    ("Arizona", "Maricopa", 61.0),
    ("Arizona", "Pima", 47.0),
    ("Colorado", "Denver", 49.0),
    ("Colorado", "Boulder", 41.0),
];

/// (location, mean temperature °C, seasonal swing °C, humidity %)
const LOCATIONS: &[(&str, f64, f64, f64)] = &[
    ("Phoenix", 24.0, 10.0, 25.0),
    ("Denver", 10.0, 12.0, 45.0),
    ("Cleveland", 10.5, 13.0, 70.0),
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Air quality: one CSV per year
// ---------------------------------------------------------------------------

fn write_air_quality(dir: &Path, rng: &mut SimpleRng) -> usize {
    std::fs::create_dir_all(dir).expect("Failed to create air-quality directory");
    let mut rows = 0;
    for year in FIRST_YEAR..=LAST_YEAR {
        let path = dir.join(format!("annual_aqi_by_county_{year}.csv"));
        let mut writer = csv::Writer::from_path(&path).expect("Failed to create CSV shard");
        writer
            .write_record(
                ["State", "County", "Year"]
                    .iter()
                    .chain(airwatch::data::schema::AIR_QUALITY_METRICS),
            )
            .expect("Failed to write header");

        // Slow improvement over the years.
        let drift = -(year - FIRST_YEAR) as f64 * 0.8;
        for &(state, county, base) in COUNTIES {
            let median = (base + drift + rng.gauss(0.0, 3.0)).round().max(5.0);
            let p90 = (median * 1.6 + rng.gauss(0.0, 4.0)).round();
            let max = (p90 * 1.8 + rng.gauss(0.0, 10.0)).round();
            let days = 365.0 - (rng.next_f64() * 20.0).round();
            let good = (days * (1.0 - median / 100.0)).round().max(0.0);
            let moderate = (days - good) * 0.85;
            let sensitive = (days - good - moderate) * 0.7;
            let unhealthy = days - good - moderate - sensitive;

            let mut record = vec![state.to_string(), county.to_string(), year.to_string()];
            record.extend(
                [
                    days,
                    good,
                    moderate.round(),
                    sensitive.round(),
                    unhealthy.round(),
                    0.0,
                    0.0,
                    max,
                    p90,
                    median,
                ]
                .iter()
                .map(|v| format!("{v}")),
            );
            writer.write_record(&record).expect("Failed to write row");
            rows += 1;
        }

        // One malformed row per shard so the dropped-row path is visible.
        let mut bad = vec!["Ohio".to_string(), String::new(), year.to_string()];
        bad.extend(std::iter::repeat("NA".to_string()).take(10));
        writer.write_record(&bad).expect("Failed to write row");

        writer.flush().expect("Failed to flush CSV shard");
    }
    rows
}

// ---------------------------------------------------------------------------
// Weather: Parquet for most locations, CSV shard for the last
// ---------------------------------------------------------------------------

struct Reading {
    location: String,
    date_time: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
    precipitation: Option<f64>,
    wind_speed: Option<f64>,
}

fn readings_for(
    (location, mean, swing, humidity): (&str, f64, f64, f64),
    rng: &mut SimpleRng,
) -> Vec<Reading> {
    let start = NaiveDate::from_ymd_opt(FIRST_YEAR, 1, 1).expect("valid start date");
    let end = NaiveDate::from_ymd_opt(LAST_YEAR, 12, 31).expect("valid end date");
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        let doy = (day - start).num_days() as f64;
        let seasonal = -swing * (2.0 * std::f64::consts::PI * doy / 365.25).cos();
        // Occasional sensor outage.
        let outage = rng.next_f64() < 0.01;
        for hour in [6, 18] {
            let diurnal = if hour == 6 { -3.0 } else { 3.0 };
            let rain = if rng.next_f64() < 0.15 {
                rng.next_f64() * 12.0
            } else {
                0.0
            };
            out.push(Reading {
                location: location.to_string(),
                date_time: format!("{} {hour:02}:00:00", day.format("%Y-%m-%d")),
                temperature: (!outage).then(|| mean + seasonal + diurnal + rng.gauss(0.0, 2.0)),
                humidity: Some((humidity + rng.gauss(0.0, 8.0)).clamp(3.0, 100.0)),
                precipitation: Some(rain),
                wind_speed: Some(rng.gauss(12.0, 4.0).abs()),
            });
        }
        day += Duration::days(1);
    }
    out
}

fn write_weather_parquet(path: &Path, readings: &[Reading]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("Location", DataType::Utf8, false),
        Field::new("Date_Time", DataType::Utf8, false),
        Field::new("Temperature_C", DataType::Float64, true),
        Field::new("Humidity_pct", DataType::Float64, true),
        Field::new("Precipitation_mm", DataType::Float64, true),
        Field::new("Wind_Speed_kmh", DataType::Float64, true),
    ]));

    let floats = |f: fn(&Reading) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(readings.iter().map(f).collect::<Vec<_>>()))
    };

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(
                readings.iter().map(|r| r.location.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                readings.iter().map(|r| r.date_time.as_str()).collect::<Vec<_>>(),
            )),
            floats(|r| r.temperature),
            floats(|r| r.humidity),
            floats(|r| r.precipitation),
            floats(|r| r.wind_speed),
        ],
    )
    .expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}

fn write_weather_csv(path: &Path, readings: &[Reading]) {
    let cell = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_default();
    let mut writer = csv::Writer::from_path(path).expect("Failed to create CSV shard");
    writer
        .write_record([
            "Location",
            "Date_Time",
            "Temperature_C",
            "Humidity_pct",
            "Precipitation_mm",
            "Wind_Speed_kmh",
        ])
        .expect("Failed to write header");
    for r in readings {
        writer
            .write_record([
                r.location.clone(),
                r.date_time.clone(),
                cell(r.temperature),
                cell(r.humidity),
                cell(r.precipitation),
                cell(r.wind_speed),
            ])
            .expect("Failed to write row");
    }
    writer.flush().expect("Failed to flush CSV shard");
}

fn main() {
    let mut rng = SimpleRng::new(42);
    let root = Path::new(OUTPUT_DIR);

    let aq_rows = write_air_quality(&root.join("air_quality"), &mut rng);

    let weather_dir = root.join("weather");
    std::fs::create_dir_all(&weather_dir).expect("Failed to create weather directory");
    let (csv_location, parquet_locations) = LOCATIONS.split_last().expect("at least one location");

    let parquet_readings: Vec<Reading> = parquet_locations
        .iter()
        .flat_map(|&loc| readings_for(loc, &mut rng))
        .collect();
    write_weather_parquet(&weather_dir.join("weather_observations.parquet"), &parquet_readings);

    let csv_readings = readings_for(*csv_location, &mut rng);
    write_weather_csv(
        &weather_dir.join(format!("weather_{}.csv", csv_location.0.to_lowercase())),
        &csv_readings,
    );

    println!(
        "Wrote {aq_rows} county-year rows and {} weather readings to {OUTPUT_DIR}/",
        parquet_readings.len() + csv_readings.len()
    );
}
