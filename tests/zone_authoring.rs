use std::fs;

use stls::authoring::{AuthoringSession, SessionEvent};
use stls::zone_file::{load_zones, ZoneFile, ZoneFileWriter};
use stls::zones::Point;
use stls::Error;

fn click_all(session: &mut AuthoringSession, points: &[(i32, i32)]) {
    for &(x, y) in points {
        session.click(Point::new(x, y));
    }
}

#[test]
fn test_authored_file_layout() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("zones.txt");
    // stale content from an earlier session is replaced, not appended to
    fs::write(&path, "zones: \n   0: [(1, 1)]\n").unwrap();

    let mut session = AuthoringSession::new(ZoneFileWriter::new(&path, 2, 640, 480), 'q');
    click_all(&mut session, &[(10, 10), (200, 10), (200, 150), (10, 150)]);
    assert_eq!(session.key('c').unwrap(), SessionEvent::Redraw);
    assert_eq!(session.key('s').unwrap(), SessionEvent::Redraw);
    assert_eq!(session.key('n').unwrap(), SessionEvent::NextFrame);
    click_all(&mut session, &[(300, 300), (400, 300), (350, 420)]);
    session.key('s').unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "zones: \n   0: [(10, 10), (200, 10), (200, 150), (10, 150)]\n   1: [(300, 300), (400, 300), (350, 420)]\n\nnumber_of_zone: 2\nframe_width: 640\nframe_height: 480\n"
    );

    assert_eq!(session.key('s').unwrap(), SessionEvent::Finished);
    assert_eq!(fs::read_to_string(&path).unwrap(), text);
}

#[test]
fn test_authored_zones_load_at_another_size() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("zones.txt");
    let mut writer = ZoneFileWriter::new(&path, 1, 640, 480);
    assert!(writer
        .append_zone(&[Point::new(100, 100), Point::new(300, 100), Point::new(200, 301)])
        .unwrap());
    assert!(writer.is_complete());

    let zones = load_zones(&path, 1280, 720).unwrap();
    assert_eq!((zones.frame_width, zones.frame_height), (1280, 720));
    assert_eq!(
        zones.get(0).unwrap().points,
        vec![Point::new(200, 150), Point::new(600, 150), Point::new(400, 451)]
    );

    let file = ZoneFile::read(&path).unwrap();
    assert_eq!(file.number_of_zones, Some(1));
    assert!(file.warnings.is_empty());
}

#[test]
fn test_unfinished_file_fails_to_scale() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("zones.txt");
    let mut writer = ZoneFileWriter::new(&path, 3, 640, 480);
    writer
        .append_zone(&[Point::new(1, 1), Point::new(9, 1), Point::new(9, 9)])
        .unwrap();

    // no footer yet, so the authoring size is unknown
    let file = ZoneFile::read(&path).unwrap();
    assert_eq!(file.warnings.len(), 2);
    let err = load_zones(&path, 640, 480).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{:?}", err);
}

#[test]
fn test_missing_zone_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_zones(dir.path().join("nope.txt"), 640, 480).unwrap_err();
    assert!(matches!(err, Error::FileNotFound { what: "zones", .. }));
    assert!(err.to_string().contains("does not exist"));
}
