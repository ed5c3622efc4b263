use std::collections::BTreeMap;

const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

pub fn coco_names() -> Vec<String> {
    COCO_NAMES.iter().map(|n| n.to_string()).collect()
}

/// Parses the `names` entry Ultralytics writes into exported models,
/// e.g. `{0: 'person', 1: 'bicycle'}`. Ids must run from 0 without gaps.
pub fn parse_names_metadata(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;

    let mut names = BTreeMap::new();
    let mut rest = body;
    while !rest.trim().is_empty() {
        let (key, value) = rest.split_once(':')?;
        let id: usize = key.trim().trim_start_matches(',').trim().parse().ok()?;

        let value = value.trim_start();
        let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let value = &value[1..];
        let end = value.find(quote)?;
        names.insert(id, value[..end].to_string());
        rest = &value[end + 1..];
    }

    if names.is_empty() || names.keys().enumerate().any(|(i, id)| i != *id) {
        return None;
    }
    Some(names.into_values().collect())
}

pub fn class_name(names: &[String], class_id: usize) -> String {
    names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class{}", class_id))
}
