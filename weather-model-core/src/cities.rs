//! Static table of supported cities.

use serde::Serialize;

use crate::{Coordinates, PredictError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub slug: &'static str,
    pub name: &'static str,
    pub region: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl City {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

pub const CITIES: &[City] = &[
    City {
        slug: "lima",
        name: "Lima",
        region: "Lima",
        lat: -12.0464,
        lng: -77.0428,
    },
    City {
        slug: "arequipa",
        name: "Arequipa",
        region: "Arequipa",
        lat: -16.4090,
        lng: -71.5375,
    },
    City {
        slug: "trujillo",
        name: "Trujillo",
        region: "La Libertad",
        lat: -8.1116,
        lng: -79.0288,
    },
    City {
        slug: "cusco",
        name: "Cusco",
        region: "Cusco",
        lat: -13.5320,
        lng: -71.9675,
    },
    City {
        slug: "piura",
        name: "Piura",
        region: "Piura",
        lat: -5.1945,
        lng: -80.6328,
    },
    City {
        slug: "iquitos",
        name: "Iquitos",
        region: "Loreto",
        lat: -3.7437,
        lng: -73.2516,
    },
    City {
        slug: "chiclayo",
        name: "Chiclayo",
        region: "Lambayeque",
        lat: -6.7714,
        lng: -79.8409,
    },
    City {
        slug: "huancayo",
        name: "Huancayo",
        region: "Junín",
        lat: -12.0651,
        lng: -75.2049,
    },
    City {
        slug: "tacna",
        name: "Tacna",
        region: "Tacna",
        lat: -18.0066,
        lng: -70.2463,
    },
    City {
        slug: "puno",
        name: "Puno",
        region: "Puno",
        lat: -15.8402,
        lng: -70.0219,
    },
];

/// Look a city up by name or slug, ignoring case, accents and surrounding
/// whitespace.
pub fn find(query: &str) -> Result<&'static City, PredictError> {
    let wanted = normalize(query);
    if wanted.is_empty() {
        return Err(PredictError::InvalidInput("City name must not be empty.".to_string()));
    }

    CITIES
        .iter()
        .find(|c| c.slug == wanted || normalize(c.name) == wanted)
        .ok_or_else(|| PredictError::NotFound(format!("Unknown city '{}'.", query.trim())))
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}
