/// Output classes of the network, in the order of its final layer.
pub const CLASS_LABELS: [&str; 7] = [
    "BacterialBlight",
    "BacterialLeafBlight",
    "BacterialLeafStreak",
    "Blast",
    "BrownSpot",
    "Normal",
    "SheathBlight",
];

pub fn label_for(index: usize) -> Option<&'static str> {
    CLASS_LABELS.get(index).copied()
}
