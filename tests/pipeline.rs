//! End-to-end runs of the season-goals job through the standalone engine.

use mrseason::standalone::engine::{run_job, SUCCESS_MARKER, TEMPORARY_DIR};
use mrseason::standalone::{Job, ShuffleMode};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "match_id,home_team_id,away_team_id,home_score,away_score,date,attendance\n";

fn write_input(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), format!("{HEADER}{body}")).unwrap();
}

/// Every output file's rows, in file order.
fn output_files(output: &Path) -> Vec<Vec<String>> {
    let mut files: Vec<_> = fs::read_dir(output)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("mr-out-"))
        })
        .collect();
    files.sort();
    files
        .iter()
        .map(|p| fs::read_to_string(p).unwrap().lines().map(String::from).collect())
        .collect()
}

fn sorted_rows(output: &Path) -> Vec<String> {
    let mut rows: Vec<String> = output_files(output).into_iter().flatten().collect();
    rows.sort();
    rows
}

fn job_for(input: &Path, output: &Path) -> Job {
    Job::new(input.to_str().unwrap(), output.to_str().unwrap())
}

/// A few seasons of results for six teams, with the odd broken line.
fn league_fixture() -> String {
    let teams = ["ars", "bha", "che", "eve", "liv", "tot"];
    let mut body = String::new();
    let mut n = 0;
    for (year, month) in [(2017, 9), (2018, 3), (2018, 8), (2019, 1), (2019, 10)] {
        for (h, home) in teams.iter().enumerate() {
            for (a, away) in teams.iter().enumerate() {
                if h == a {
                    continue;
                }
                n += 1;
                body.push_str(&format!(
                    "m{n},{home},{away},{},{},{year}-{month:02}-15T15:00,30000\n",
                    (h * 7 + a + n) % 5,
                    (a * 3 + h + n) % 4
                ));
                if n % 17 == 0 {
                    body.push_str(&format!("bad{n},{home},{away},x,1,{year}-{month:02}-15\n"));
                }
            }
        }
    }
    body
}

#[tokio::test]
async fn worked_example() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(
        &input,
        format!("{HEADER}m1,A,B,2,1,2018-03-19,1000\nm2,A,C,0,3,2018-09-01,500\n"),
    )
    .unwrap();
    let output = dir.path().join("out");

    let counters = run_job(&job_for(&input, &output)).await.unwrap();

    assert_eq!(
        sorted_rows(&output),
        vec![
            "A\t2018\t1\t2.0",
            "A\t2019\t1\t0.0",
            "B\t2018\t1\t1.0",
            "C\t2019\t1\t3.0",
        ]
    );
    assert_eq!(counters.map_output_records, 4);
    assert_eq!(counters.reduce_groups, 4);
    assert!(output.join(SUCCESS_MARKER).exists());
    assert_eq!(output_files(&output).len(), 11);
}

#[tokio::test]
async fn legacy_away_key_reproduces_first_version() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(
        &input,
        format!("{HEADER}m1,A,B,2,1,2018-03-19,1000\nm2,A,C,0,3,2018-09-01,500\n"),
    )
    .unwrap();
    let output = dir.path().join("out");

    let mut job = job_for(&input, &output);
    job.args = vec!["--legacy-away-key".into()];
    run_job(&job).await.unwrap();

    assert_eq!(
        sorted_rows(&output),
        vec!["A\t2018\t2\t1.5", "A\t2019\t2\t1.5"]
    );
}

#[tokio::test]
async fn combining_and_spilling_do_not_change_results() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    write_input(&input, "part-a.csv", &league_fixture());
    write_input(&input, "part-b.csv", &league_fixture());

    let mut baseline = job_for(&input, &dir.path().join("plain"));
    baseline.combine = false;
    baseline.n_reduce = 1;
    run_job(&baseline).await.unwrap();
    let expected = sorted_rows(&dir.path().join("plain"));
    assert!(!expected.is_empty());

    for (name, combine, shuffle, split_size, n_reduce) in [
        ("combined", true, ShuffleMode::Memory, 1 << 20, 4),
        ("small-splits", true, ShuffleMode::Memory, 256, 3),
        ("spilled", true, ShuffleMode::Spill, 300, 5),
        ("spilled-raw", false, ShuffleMode::Spill, 1 << 20, 2),
    ] {
        let output = dir.path().join(name);
        let mut job = job_for(&input, &output);
        job.combine = combine;
        job.shuffle = shuffle;
        job.split_size = split_size;
        job.n_reduce = n_reduce;
        run_job(&job).await.unwrap();

        assert_eq!(sorted_rows(&output), expected, "variant {name}");
        assert!(!output.join(TEMPORARY_DIR).exists(), "variant {name}");
    }
}

#[tokio::test]
async fn rows_within_a_partition_follow_key_order() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(&input, format!("{HEADER}{}", league_fixture())).unwrap();
    let output = dir.path().join("out");

    let mut job = job_for(&input, &output);
    job.n_reduce = 3;
    job.split_size = 512;
    run_job(&job).await.unwrap();

    for rows in output_files(&output) {
        let keys: Vec<(String, i32)> = rows
            .iter()
            .map(|row| {
                let mut fields = row.split('\t');
                let id = fields.next().unwrap().to_string();
                let season = fields.next().unwrap().parse().unwrap();
                (id, season)
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}

#[tokio::test]
async fn malformed_lines_do_not_fail_the_job() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(
        &input,
        format!(
            "{HEADER}m1,A,B,2,1,2018-03-19,1\nm2,A,B,two,1,2018-03-20,1\nm3,A,B\nm4,A,B,1,1,03/2018,1\nm5,B,A,4,0,2018-04-01,1\n"
        ),
    )
    .unwrap();
    let output = dir.path().join("out");

    run_job(&job_for(&input, &output)).await.unwrap();

    assert_eq!(
        sorted_rows(&output),
        vec!["A\t2018\t2\t1.0", "B\t2018\t2\t2.5"]
    );
}

#[tokio::test]
async fn every_file_drops_its_own_header() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();
    write_input(&input, "a.csv", "m1,A,B,1,0,2018-01-01,1\n");
    write_input(&input, "b.csv", "m2,A,B,3,0,2018-01-01,1\n");
    let output = dir.path().join("out");

    run_job(&job_for(&input, &output)).await.unwrap();

    assert_eq!(
        sorted_rows(&output),
        vec!["A\t2018\t2\t2.0", "B\t2018\t2\t0.0"]
    );
}

#[tokio::test]
async fn existing_output_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(&input, format!("{HEADER}m1,A,B,2,1,2018-03-19,1000\n")).unwrap();
    let output = dir.path().join("out");
    fs::create_dir(&output).unwrap();

    let err = run_job(&job_for(&input, &output)).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn missing_input_fails_without_creating_output() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out");

    assert!(run_job(&job_for(&dir.path().join("nope.csv"), &output))
        .await
        .is_err());
    assert!(!output.exists());
}

#[tokio::test]
async fn unknown_workload_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("matches.csv");
    fs::write(&input, HEADER).unwrap();

    let mut job = job_for(&input, &dir.path().join("out"));
    job.workload = "wc".into();
    assert!(run_job(&job).await.is_err());
}
