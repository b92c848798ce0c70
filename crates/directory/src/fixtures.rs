//! Sample directory used by the demo client, the seed command and tests.

use shared::domain::{Lawyer, LawyerId};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn sample_lawyers() -> Vec<Lawyer> {
    vec![
        Lawyer {
            id: LawyerId(1),
            name: "张明华".into(),
            avatar: "/avatars/zhang-minghua.png".into(),
            bio: "专注刑事辩护十五年，办理重大刑事案件三百余件。".into(),
            education: "中国政法大学 法学硕士".into(),
            certifications: strings(&["律师执业证", "刑事辩护专业资格"]),
            specialties: strings(&["刑事辩护", "经济犯罪"]),
            experience: 15,
            rating: 4.8,
            review_count: 326,
            hourly_rate: 500,
            location: "北京市朝阳区".into(),
            response_time: "30分钟内".into(),
            languages: strings(&["中文", "English"]),
            is_online: true,
        },
        Lawyer {
            id: LawyerId(2),
            name: "李婉清".into(),
            avatar: "/avatars/li-wanqing.png".into(),
            bio: "擅长离婚财产分割与子女抚养权纠纷。".into(),
            education: "华东政法大学 法学学士".into(),
            certifications: strings(&["律师执业证", "家事调解员"]),
            specialties: strings(&["婚姻家庭", "继承纠纷"]),
            experience: 12,
            rating: 4.9,
            review_count: 512,
            hourly_rate: 400,
            location: "上海市浦东新区".into(),
            response_time: "15分钟内".into(),
            languages: strings(&["中文"]),
            is_online: true,
        },
        Lawyer {
            id: LawyerId(3),
            name: "王建国".into(),
            avatar: "/avatars/wang-jianguo.png".into(),
            bio: "为上市公司及中小企业提供常年法律顾问服务。".into(),
            education: "北京大学 法学博士".into(),
            certifications: strings(&["律师执业证", "证券从业资格"]),
            specialties: strings(&["公司法务", "合同纠纷"]),
            experience: 20,
            rating: 4.7,
            review_count: 248,
            hourly_rate: 800,
            location: "广州市天河区".into(),
            response_time: "1小时内".into(),
            languages: strings(&["中文", "English", "粤语"]),
            is_online: false,
        },
        Lawyer {
            id: LawyerId(4),
            name: "陈思远".into(),
            avatar: "/avatars/chen-siyuan.png".into(),
            bio: "处理劳动仲裁及知识产权侵权案件经验丰富。".into(),
            education: "武汉大学 法学硕士".into(),
            certifications: strings(&["律师执业证", "专利代理师"]),
            specialties: strings(&["劳动争议", "知识产权"]),
            experience: 8,
            rating: 4.6,
            review_count: 189,
            hourly_rate: 300,
            location: "深圳市南山区".into(),
            response_time: "2小时内".into(),
            languages: strings(&["中文"]),
            is_online: true,
        },
    ]
}
