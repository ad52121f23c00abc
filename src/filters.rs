//! Class-name level predicates used to separate framework plumbing from
//! business objects in retainer chains. All predicates operate on normalized
//! display names (`java.util.HashMap`, `byte[]`, ...).

const JDK_PREFIXES: &[&str] = &[
    "java.",
    "javax.",
    "jdk.",
    "sun.",
    "com.sun.",
    "org.w3c.",
    "org.xml.",
    "org.ietf.",
    "org.omg.",
];

const FRAMEWORK_PREFIXES: &[&str] = &[
    "org.springframework.",
    "org.apache.",
    "org.eclipse.",
    "org.hibernate.",
    "org.jboss.",
    "org.slf4j.",
    "org.yaml.",
    "org.aspectj.",
    "org.objectweb.",
    "io.netty.",
    "io.micrometer.",
    "io.grpc.",
    "com.google.",
    "com.fasterxml.",
    "com.zaxxer.",
    "ch.qos.logback.",
    "kotlin.",
    "kotlinx.",
    "scala.",
    "groovy.",
    "okhttp3.",
    "okio.",
    "reactor.",
    "rx.",
];

/// Runtime-generated or proxy classes that carry no business meaning even
/// when they live in an application package.
const GENERATED_MARKERS: &[&str] = &["$$", "$Proxy", "$Lambda", "CGLIB$", "ByteBuddy"];

/// True for JDK-internal classes, primitive arrays included.
pub fn is_jdk_internal(class_name: &str) -> bool {
    if is_primitive_array(class_name) {
        return true;
    }
    JDK_PREFIXES.iter().any(|p| class_name.starts_with(p))
}

/// True for well-known framework and library namespaces.
pub fn is_framework_internal(class_name: &str) -> bool {
    FRAMEWORK_PREFIXES.iter().any(|p| class_name.starts_with(p))
}

/// True when the class is neither JDK- nor framework-internal.
pub fn is_application_level(class_name: &str) -> bool {
    !class_name.is_empty() && !is_jdk_internal(class_name) && !is_framework_internal(class_name)
}

/// Application-level classes minus generated proxies and lambdas.
pub fn is_business(class_name: &str) -> bool {
    is_application_level(class_name) && !GENERATED_MARKERS.iter().any(|m| class_name.contains(m))
}

fn is_primitive_array(class_name: &str) -> bool {
    matches!(
        class_name.trim_end_matches("[]"),
        "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
    ) && class_name.ends_with("[]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jdk_classes_are_internal() {
        assert!(is_jdk_internal("java.util.HashMap"));
        assert!(is_jdk_internal("sun.misc.Unsafe"));
        assert!(is_jdk_internal("byte[]"));
        assert!(is_jdk_internal("int[][]"));
        assert!(!is_jdk_internal("com.acme.orders.Order"));
    }

    #[test]
    fn framework_classes_are_not_application_level() {
        assert!(is_framework_internal("org.springframework.beans.BeanUtils"));
        assert!(is_framework_internal("io.netty.buffer.ByteBuf"));
        assert!(!is_application_level("io.netty.buffer.ByteBuf"));
        assert!(is_application_level("com.acme.orders.Order"));
    }

    #[test]
    fn generated_classes_are_not_business() {
        assert!(is_business("com.acme.orders.Order"));
        assert!(!is_business("com.acme.orders.Order$$EnhancerBySpringCGLIB$$1"));
        assert!(!is_business("com.acme.orders.Order$Proxy12"));
        assert!(!is_business("com.acme.Handler$Lambda$33"));
    }

    #[test]
    fn object_arrays_follow_their_element_namespace() {
        assert!(is_jdk_internal("java.lang.String[]"));
        assert!(!is_jdk_internal("com.acme.Order[]"));
    }
}
