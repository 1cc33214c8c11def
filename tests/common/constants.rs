pub const BAND_1: &str = "band-the-lanterns";
pub const BAND_2: &str = "band-night-owls";

pub const GIG_LIST_NAME: &str = "Friday at the Roxy";

/// Five songs in the order they are added to a fresh list.
pub const SONGS: [(&str, &str); 5] = [
    ("Paranoid", "Black Sabbath"),
    ("Black Dog", "Led Zeppelin"),
    ("Everlong", "Foo Fighters"),
    ("Jolene", "Dolly Parton"),
    ("Creep", "Radiohead"),
];
