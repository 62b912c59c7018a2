use locus_common::dump::parse_dump;
use locus_common::protocol::{DeviceResponse, MatchCriteria, Strategy, verify_bounds_handoff};
use locus_common::Bounds;

const DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" class="android.widget.FrameLayout" package="com.demo" bounds="[0,0][1080,2400]">
    <node index="0" text="关注" resource-id="com.demo:id/btn_follow" class="android.widget.Button" package="com.demo" clickable="true" bounds="[864,2240][1080,2358]" />
  </node>
</hierarchy>"#;

#[test]
fn test_bounds_survive_dump_and_payload_verbatim() {
    let tree = parse_dump(DUMP).unwrap();
    let button = tree
        .elements()
        .find(|id| tree.node(*id).text() == "关注")
        .unwrap();
    let before = tree.node(button).bounds_str().unwrap().to_string();
    assert_eq!(before, "[864,2240][1080,2358]");

    let mut criteria = MatchCriteria::new(Strategy::Absolute);
    criteria.fields = vec!["bounds".into(), "text".into()];
    criteria.values.insert("bounds".into(), before.clone());
    criteria.values.insert("text".into(), "关注".into());

    let wire = serde_json::to_string(&criteria).unwrap();
    let back: MatchCriteria = serde_json::from_str(&wire).unwrap();
    let after = back.values["bounds"].clone();

    assert!(verify_bounds_handoff(&before, &after).is_ok());
    assert_eq!(Bounds::parse(&after), Some(Bounds::new(864, 2240, 1080, 2358)));
}

#[test]
fn test_reformatted_bounds_are_rejected() {
    // Same rectangle, different text: still a changed hand-off.
    let before = "[864,2240][1080,2358]";
    let after = "[864, 2240][1080, 2358]";
    assert!(verify_bounds_handoff(before, after).is_err());
}

#[test]
fn test_device_preview_bounds_compare_with_source() {
    let resp: DeviceResponse = serde_json::from_str(
        r#"{"ok":true,"message":"matched","total":1,"matchedIndex":0,
            "preview":{"xpath":"//node[@text='关注']","bounds":"[864,2240][1080,2358]"}}"#,
    )
    .unwrap();
    let preview = resp.preview.unwrap();
    assert!(verify_bounds_handoff("[864,2240][1080,2358]", preview.bounds.as_deref().unwrap()).is_ok());
}
