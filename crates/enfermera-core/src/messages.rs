//! User-facing copy. The product speaks Spanish.

pub const APP_TITLE: &str = "Enfermera App";
pub const SEARCH_PLACEHOLDER: &str = "Escribe un tema de salud, por ej: 'síntomas de la gripe'";

pub const EMPTY_TOPIC: &str = "Por favor, introduce un tema para buscar.";
pub const BACKEND_UNAVAILABLE: &str =
    "No se pudo obtener una respuesta de la IA. Verifica tu conexión o la clave de API.";
pub const SEARCH_IN_PROGRESS: &str = "Ya hay una búsqueda en curso. Espera a que termine.";

pub const UNTITLED: &str = "Sin título";

pub const WELCOME: &str = "¿Qué tema de salud te gustaría consultar hoy?";
pub const LOADING: &str = "Buscando en la web y generando resumen...";
pub const NO_RESULTS_TITLE: &str = "No se encontraron resultados";
pub const NO_RESULTS_HINT: &str = "Intenta con un término de búsqueda diferente.";
pub const SUMMARY_HEADING: &str = "Resumen IA";
pub const ARTICLES_HEADING: &str = "Artículos Encontrados";
pub const ERROR_PREFIX: &str = "Error: ";
