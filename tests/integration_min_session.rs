// Drives the compiled binary through a PTY so the real event loop, crossterm
// input handling and the SQLite sink run end to end.
//
// Requires a TTY (expectrl allocates a pseudo terminal), so it is Unix-only
// and ignored by default:
//   cargo test --test integration_min_session -- --ignored

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};
use typemark::results::{Identity, ResultReader, ResultsDb};

#[test]
#[ignore]
fn minimal_exam_is_recorded() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let passage = dir.path().join("passage.txt");
    std::fs::write(&passage, "hi there")?;
    let db_path = dir.path().join("results.db");
    let config = dir.path().join("exam.json");

    let bin = assert_cmd::cargo::cargo_bin("typemark");
    let cmd = format!(
        "{} --user ada --text-file {} --db {} --config {}",
        bin.display(),
        passage.display(),
        db_path.display(),
        config.display()
    );

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(300));

    p.send("hi there")?;
    std::thread::sleep(Duration::from_millis(1200));

    // tab finishes, escape leaves the results screen
    p.send("\t")?;
    std::thread::sleep(Duration::from_millis(300));
    p.send("\x1b")?;
    p.expect(Eof)?;

    let db = ResultsDb::open(&db_path)?;
    let ada: Identity = db.find_user("ada")?.expect("user created on start");
    let history = db.history(&ada, 10)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].typed_text, "hi there");
    assert_eq!(history[0].score.correct_words, 2);
    Ok(())
}
